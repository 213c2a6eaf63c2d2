//! Synthetic trainer
//!
//! A single linear layer pulled toward a node-specific target by plain
//! gradient descent on `0.5 * ||w - target||^2`. Each node gets a different
//! target, so federated averaging visibly moves every node toward the mean.
//! Fully deterministic for a given seed.

use anyhow::{bail, Context};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::TrainingSettings;
use crate::types::{Contribution, RoundNumber, Tensor};

use super::Trainer;

pub const WEIGHT_PARAM: &str = "output_layer.weight";
pub const BIAS_PARAM: &str = "output_layer.bias";

/// Deterministic stand-in for a real training loop
#[derive(Debug, Clone)]
pub struct SyntheticTrainer {
    input_dim: usize,
    learning_rate: f32,
    local_steps: u32,
    /// Weights followed by the bias
    target: Vec<f32>,
}

impl SyntheticTrainer {
    pub fn new(input_dim: usize, learning_rate: f32, local_steps: u32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let target = (0..=input_dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        Self {
            input_dim,
            learning_rate,
            local_steps,
            target,
        }
    }

    /// Seed from settings, falling back to a hash of the node name
    pub fn from_settings(node_name: &str, settings: &TrainingSettings) -> Self {
        let seed = settings.seed.unwrap_or_else(|| name_seed(node_name));
        Self::new(
            settings.input_dim,
            settings.learning_rate,
            settings.local_steps,
            seed,
        )
    }

    pub fn target(&self) -> &[f32] {
        &self.target
    }

    /// All-zero parameters in the trainer's layout
    pub fn zeros(&self) -> Contribution {
        Contribution::new()
            .with_param(WEIGHT_PARAM, Tensor::zeros(vec![1, self.input_dim]))
            .with_param(BIAS_PARAM, Tensor::zeros(vec![1]))
    }

    /// Flatten `initial` into weights-then-bias, checking the layout
    fn unpack(&self, initial: &Contribution) -> anyhow::Result<Vec<f32>> {
        let weight = initial
            .get(WEIGHT_PARAM)
            .with_context(|| format!("initial contribution has no '{}'", WEIGHT_PARAM))?;
        let bias = initial
            .get(BIAS_PARAM)
            .with_context(|| format!("initial contribution has no '{}'", BIAS_PARAM))?;

        if weight.shape != [1, self.input_dim] || !weight.is_consistent() {
            bail!(
                "'{}' has shape {:?}, expected [1, {}]",
                WEIGHT_PARAM,
                weight.shape,
                self.input_dim
            );
        }
        if bias.shape != [1] || !bias.is_consistent() {
            bail!("'{}' has shape {:?}, expected [1]", BIAS_PARAM, bias.shape);
        }

        let mut params = weight.data.clone();
        params.extend_from_slice(&bias.data);
        Ok(params)
    }

    fn loss(&self, params: &[f32]) -> f32 {
        params
            .iter()
            .zip(&self.target)
            .map(|(p, t)| 0.5 * (p - t) * (p - t))
            .sum()
    }
}

#[async_trait]
impl Trainer for SyntheticTrainer {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn train_local(
        &self,
        round: RoundNumber,
        initial: Option<&Contribution>,
    ) -> anyhow::Result<Contribution> {
        let mut params = match initial {
            Some(global) => self.unpack(global)?,
            None => vec![0.0; self.input_dim + 1],
        };

        let start_loss = self.loss(&params);
        for _ in 0..self.local_steps {
            for (p, t) in params.iter_mut().zip(&self.target) {
                *p -= self.learning_rate * (*p - t);
            }
        }
        debug!(
            round,
            steps = self.local_steps,
            start_loss,
            end_loss = self.loss(&params),
            "Synthetic training finished"
        );

        let bias = params.split_off(self.input_dim);
        Ok(Contribution::new()
            .with_param(WEIGHT_PARAM, Tensor::new(vec![1, self.input_dim], params)?)
            .with_param(BIAS_PARAM, Tensor::new(vec![1], bias)?))
    }
}

/// First eight bytes of the SHA-256 of `name`
fn name_seed(name: &str) -> u64 {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
