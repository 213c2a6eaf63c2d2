//! Federated averaging
//!
//! Element-wise arithmetic mean of every parameter across contributions.
//! Inputs are validated up front: all contributions must carry the same
//! parameter names with the same shapes, otherwise aggregation fails with
//! [`Error::ShapeMismatch`] before any arithmetic happens.

use crate::error::{Error, Result};
use crate::types::{Contribution, Tensor};

/// Strategy for combining contributions into one global contribution
pub trait Aggregator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Combine a non-empty set of contributions
    fn aggregate(&self, contributions: &[std::sync::Arc<Contribution>]) -> Result<Contribution>;
}

/// Plain federated averaging (equal weight per contribution)
#[derive(Debug, Default, Clone, Copy)]
pub struct FedAvg;

impl Aggregator for FedAvg {
    fn name(&self) -> &'static str {
        "fedavg"
    }

    fn aggregate(&self, contributions: &[std::sync::Arc<Contribution>]) -> Result<Contribution> {
        fed_avg(contributions)
    }
}

/// Element-wise mean of `contributions`.
///
/// Sums are accumulated in f64, so permuting the input changes the result
/// by at most a rounding step of the final f32.
pub fn fed_avg<C: AsRef<Contribution>>(contributions: &[C]) -> Result<Contribution> {
    let reference = validate(contributions)?;
    let n = contributions.len() as f64;

    let averaged: Contribution = reference
        .iter()
        .map(|(name, first)| {
            let mut sums = vec![0.0f64; first.data.len()];
            for contribution in contributions {
                // Presence and length were checked in validate()
                if let Some(tensor) = contribution.as_ref().get(name) {
                    for (acc, value) in sums.iter_mut().zip(&tensor.data) {
                        *acc += f64::from(*value);
                    }
                }
            }
            let data = sums.into_iter().map(|s| (s / n) as f32).collect();
            (
                name.to_string(),
                Tensor {
                    shape: first.shape.clone(),
                    data,
                },
            )
        })
        .collect();

    Ok(averaged)
}

/// Check that every contribution matches the first one's layout
fn validate<C: AsRef<Contribution>>(contributions: &[C]) -> Result<&Contribution> {
    let reference = contributions.first().ok_or(Error::EmptyInput)?.as_ref();

    for (name, tensor) in reference.iter() {
        if !tensor.is_consistent() {
            return Err(Error::shape_mismatch(
                name,
                format!(
                    "contribution 0 has {} values for shape {:?}",
                    tensor.data.len(),
                    tensor.shape
                ),
            ));
        }
    }

    for (index, contribution) in contributions.iter().enumerate().skip(1) {
        let contribution = contribution.as_ref();

        if let Some(extra) = contribution.names().find(|name| !reference.contains(name)) {
            return Err(Error::shape_mismatch(
                extra,
                format!("present in contribution {} but not in contribution 0", index),
            ));
        }

        for (name, expected) in reference.iter() {
            let actual = contribution.get(name).ok_or_else(|| {
                Error::shape_mismatch(name, format!("missing from contribution {}", index))
            })?;
            if actual.shape != expected.shape {
                return Err(Error::shape_mismatch(
                    name,
                    format!(
                        "contribution {} has shape {:?}, expected {:?}",
                        index, actual.shape, expected.shape
                    ),
                ));
            }
            if !actual.is_consistent() {
                return Err(Error::shape_mismatch(
                    name,
                    format!(
                        "contribution {} has {} values for shape {:?}",
                        index,
                        actual.data.len(),
                        actual.shape
                    ),
                ));
            }
        }
    }

    Ok(reference)
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn contribution(weight: [f32; 4], bias: f32) -> Contribution {
        Contribution::new()
            .with_param("fc.weight", Tensor::new(vec![2, 2], weight.to_vec()).unwrap())
            .with_param("fc.bias", Tensor::from_slice(&[bias]))
    }

    fn assert_close(a: &Contribution, b: &Contribution) {
        assert_eq!(a.names().collect::<Vec<_>>(), b.names().collect::<Vec<_>>());
        for (name, ta) in a.iter() {
            let tb = b.get(name).unwrap();
            assert_eq!(ta.shape, tb.shape);
            for (x, y) in ta.data.iter().zip(&tb.data) {
                assert!((x - y).abs() < 1e-6, "{}: {} vs {}", name, x, y);
            }
        }
    }

    #[test]
    fn test_mean_of_two() {
        let a = contribution([1.0, 2.0, 3.0, 4.0], 0.0);
        let b = contribution([3.0, 4.0, 5.0, 6.0], 1.0);

        let avg = fed_avg(&[a, b]).unwrap();
        assert_eq!(avg.get("fc.weight").unwrap().data, vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(avg.get("fc.weight").unwrap().shape, vec![2, 2]);
        assert_eq!(avg.get("fc.bias").unwrap().data, vec![0.5]);
    }

    #[test]
    fn test_single_contribution_is_identity() {
        let a = contribution([0.1, -0.2, 0.3, 1e-7], -4.5);
        let avg = fed_avg(&[a.clone()]).unwrap();
        assert_eq!(avg, a);
    }

    #[test]
    fn test_order_independent() {
        let a = contribution([0.1, 0.2, 0.3, 0.4], 1.0);
        let b = contribution([1e3, -2.5, 0.7, 9.9], -1.0);
        let c = contribution([-0.3, 1e-4, 5.0, 0.0], 0.25);

        let abc = fed_avg(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let cab = fed_avg(&[c.clone(), a.clone(), b.clone()]).unwrap();
        let bca = fed_avg(&[b, c, a]).unwrap();

        assert_close(&abc, &cab);
        assert_close(&abc, &bca);
    }

    #[test]
    fn test_empty_input() {
        let empty: [Contribution; 0] = [];
        assert!(matches!(fed_avg(&empty), Err(Error::EmptyInput)));
    }

    #[test]
    fn test_shape_mismatch() {
        let a = contribution([1.0; 4], 0.0);
        let b = Contribution::new()
            .with_param("fc.weight", Tensor::new(vec![4, 1], vec![1.0; 4]).unwrap())
            .with_param("fc.bias", Tensor::from_slice(&[0.0]));

        match fed_avg(&[a, b]) {
            Err(Error::ShapeMismatch { parameter, .. }) => assert_eq!(parameter, "fc.weight"),
            other => panic!("expected ShapeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_parameter() {
        let a = contribution([1.0; 4], 0.0);
        let b = Contribution::new().with_param("fc.weight", Tensor::new(vec![2, 2], vec![1.0; 4]).unwrap());

        assert!(matches!(fed_avg(&[a.clone(), b.clone()]), Err(Error::ShapeMismatch { .. })));
        // Extra parameter on the other side is rejected too
        assert!(matches!(fed_avg(&[b, a]), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_inconsistent_tensor_from_wire() {
        let a = contribution([1.0; 4], 0.0);
        let broken = Contribution::new()
            .with_param(
                "fc.weight",
                Tensor {
                    shape: vec![2, 2],
                    data: vec![1.0; 3],
                },
            )
            .with_param("fc.bias", Tensor::from_slice(&[0.0]));

        assert!(matches!(fed_avg(&[a, broken]), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_trait_object_over_arcs() {
        let aggregator: Box<dyn Aggregator> = Box::new(FedAvg);
        let inputs = vec![
            Arc::new(contribution([2.0; 4], 2.0)),
            Arc::new(contribution([4.0; 4], 4.0)),
        ];
        let avg = aggregator.aggregate(&inputs).unwrap();
        assert_eq!(aggregator.name(), "fedavg");
        assert_eq!(avg.get("fc.bias").unwrap().data, vec![3.0]);
    }
}
