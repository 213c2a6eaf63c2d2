//! Local training seam
//!
//! The round coordinator never looks inside training. It hands the trainer
//! the latest global contribution and gets a fresh local one back.

use async_trait::async_trait;

use crate::types::{Contribution, RoundNumber};

/// Produces this node's contribution for a round
#[async_trait]
pub trait Trainer: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str {
        "trainer"
    }

    /// Train locally for `round`, warm-starting from `initial` when given
    async fn train_local(
        &self,
        round: RoundNumber,
        initial: Option<&Contribution>,
    ) -> anyhow::Result<Contribution>;
}
