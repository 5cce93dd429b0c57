//! Node activation and aggregation functions.
//!
//! Names serialize in lowercase (`"sigmoid"`, `"sum"`, ...), the form stored in
//! genome records.

use serde::{Deserialize, Serialize};

/// Per-node activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Sigmoid,
    Tanh,
    Relu,
    Identity,
    Clamped,
    Gauss,
    Sin,
    Abs,
}

impl Activation {
    #[inline]
    pub fn apply(self, z: f64) -> f64 {
        match self {
            Activation::Sigmoid => {
                let z = (5.0 * z).clamp(-60.0, 60.0);
                1.0 / (1.0 + (-z).exp())
            }
            Activation::Tanh => (2.5 * z).clamp(-60.0, 60.0).tanh(),
            Activation::Relu => z.max(0.0),
            Activation::Identity => z,
            Activation::Clamped => z.clamp(-1.0, 1.0),
            Activation::Gauss => {
                let z = z.clamp(-3.4, 3.4);
                (-5.0 * z * z).exp()
            }
            Activation::Sin => (5.0 * z).clamp(-60.0, 60.0).sin(),
            Activation::Abs => z.abs(),
        }
    }
}

/// Per-node aggregation of weighted inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Product,
    Max,
    Min,
    MaxAbs,
    Median,
    Mean,
}

impl Aggregation {
    /// Aggregate weighted inputs. An empty input list aggregates to 0
    /// (1 for `Product`).
    pub fn apply(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return match self {
                Aggregation::Product => 1.0,
                _ => 0.0,
            };
        }

        match self {
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Product => values.iter().product(),
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::MaxAbs => values
                .iter()
                .copied()
                .fold(0.0, |best: f64, v| if v.abs() > best.abs() { v } else { best }),
            Aggregation::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 1 {
                    sorted[mid]
                } else {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                }
            }
            Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_midpoint() {
        assert!((Activation::Sigmoid.apply(0.0) - 0.5).abs() < 1e-12);
        assert!(Activation::Sigmoid.apply(100.0) <= 1.0);
        assert!(Activation::Sigmoid.apply(-100.0) >= 0.0);
    }

    #[test]
    fn test_tanh_bounded() {
        for z in [-1000.0, -1.0, 0.0, 1.0, 1000.0] {
            let y = Activation::Tanh.apply(z);
            assert!((-1.0..=1.0).contains(&y));
        }
    }

    #[test]
    fn test_aggregations() {
        let v = [1.0, -4.0, 3.0, 2.0];
        assert_eq!(Aggregation::Sum.apply(&v), 2.0);
        assert_eq!(Aggregation::Product.apply(&v), -24.0);
        assert_eq!(Aggregation::Max.apply(&v), 3.0);
        assert_eq!(Aggregation::Min.apply(&v), -4.0);
        assert_eq!(Aggregation::MaxAbs.apply(&v), -4.0);
        assert_eq!(Aggregation::Median.apply(&v), 1.5);
        assert_eq!(Aggregation::Mean.apply(&v), 0.5);
        assert_eq!(Aggregation::Max.apply(&[]), 0.0);
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(serde_json::to_string(&Activation::Sigmoid).unwrap(), "\"sigmoid\"");
        assert_eq!(serde_json::to_string(&Aggregation::MaxAbs).unwrap(), "\"maxabs\"");
        let parsed: Activation = serde_json::from_str("\"relu\"").unwrap();
        assert_eq!(parsed, Activation::Relu);
    }
}
