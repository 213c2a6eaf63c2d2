//! Model contributions
//!
//! A [`Contribution`] is the full set of named parameters one node produced
//! by local training, or the federation produced by averaging. It is never
//! mutated after construction; aggregation and training build new values.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Tensor
// ─────────────────────────────────────────────────────────────────

/// Dense f32 tensor in row-major order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Dimension sizes; an empty shape is a scalar
    pub shape: Vec<usize>,

    /// Row-major values, base64 little-endian on the wire
    #[serde(with = "f32_base64")]
    pub data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that the data fills the shape exactly
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let Some(expected) = element_count(&shape) else {
            return Err(Error::shape_mismatch(
                "<tensor>",
                format!("shape {:?} has too many elements", shape),
            ));
        };
        if expected != data.len() {
            return Err(Error::shape_mismatch(
                "<tensor>",
                format!(
                    "shape {:?} needs {} values, got {}",
                    shape,
                    expected,
                    data.len()
                ),
            ));
        }
        Ok(Self { shape, data })
    }

    /// Tensor of the given shape filled with zeros. A shape whose element
    /// count overflows gets no data and fails [`Tensor::is_consistent`].
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = element_count(&shape).unwrap_or(0);
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    /// One-dimensional tensor from a slice
    pub fn from_slice(values: &[f32]) -> Self {
        Self {
            shape: vec![values.len()],
            data: values.to_vec(),
        }
    }

    /// Number of elements implied by the shape, `None` on overflow
    pub fn numel(&self) -> Option<usize> {
        element_count(&self.shape)
    }

    /// Whether `data` holds exactly as many values as the shape requires.
    ///
    /// Always true for tensors built through [`Tensor::new`], but tensors
    /// decoded from the wire are only checked here.
    pub fn is_consistent(&self) -> bool {
        self.numel() == Some(self.data.len())
    }
}

fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
}

// ─────────────────────────────────────────────────────────────────
// Contribution
// ─────────────────────────────────────────────────────────────────

/// Named model parameters, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Contribution {
    params: BTreeMap<String, Tensor>,
}

impl Contribution {
    /// Empty contribution
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy extended with one more parameter
    pub fn with_param(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.params.insert(name.into(), tensor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.params.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Parameters in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parameter names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Name of the first parameter whose data does not fill its shape
    pub fn inconsistent_param(&self) -> Option<&str> {
        self.params
            .iter()
            .find(|(_, tensor)| !tensor.is_consistent())
            .map(|(name, _)| name.as_str())
    }

    /// Total scalar count across all parameters
    pub fn num_elements(&self) -> usize {
        self.params.values().map(|t| t.data.len()).sum()
    }

    /// SHA-256 over names, shapes and little-endian values, hex encoded.
    ///
    /// Identical contributions hash identically on every platform, which
    /// lets operators compare what different peers saw for a round.
    /// Not a security mechanism.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, tensor) in &self.params {
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update((tensor.shape.len() as u64).to_le_bytes());
            for dim in &tensor.shape {
                hasher.update((*dim as u64).to_le_bytes());
            }
            for value in &tensor.data {
                hasher.update(value.to_le_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

impl AsRef<Contribution> for Contribution {
    fn as_ref(&self) -> &Contribution {
        self
    }
}

impl FromIterator<(String, Tensor)> for Contribution {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Wire encoding for tensor data
// ─────────────────────────────────────────────────────────────────

mod f32_base64 {
    use super::*;
    use serde::de::Error as _;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[f32], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut bytes = Vec::with_capacity(data.len() * 4);
        for value in data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<f32>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(D::Error::custom)?;
        if bytes.len() % 4 != 0 {
            return Err(D::Error::custom(format!(
                "tensor payload of {} bytes is not a whole number of f32 values",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
