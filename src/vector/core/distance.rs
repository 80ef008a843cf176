//! Distance metrics for vector similarity calculation.
//!
//! Lower values always mean "more similar", so the search engine can order
//! candidates by ascending distance regardless of the metric in use.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VectraError};
use crate::util::simd;

/// Distance returned by [`DistanceMetric::Cosine`] when either vector has a
/// zero norm.
pub const ZERO_VECTOR_COSINE_DISTANCE: f32 = 1.0;

/// Distance metrics for vector similarity calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine distance (1 - cosine similarity)
    #[default]
    Cosine,
    /// Euclidean (L2) distance
    Euclidean,
    /// Manhattan (L1) distance
    Manhattan,
}

impl DistanceMetric {
    /// Calculate the distance between two vectors using this metric.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(VectraError::dimension_mismatch(a.len(), b.len()));
        }
        Ok(self.compute(a, b))
    }

    /// Distance without the length check; callers guarantee `a.len() == b.len()`.
    #[inline]
    pub(crate) fn compute(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => {
                let norm_a = simd::vector_magnitude_simd(a);
                let norm_b = simd::vector_magnitude_simd(b);

                if norm_a == 0.0 || norm_b == 0.0 {
                    ZERO_VECTOR_COSINE_DISTANCE
                } else {
                    let dot = simd::dot_product_simd(a, b);
                    // Rounding can push the ratio just outside [-1, 1].
                    1.0 - (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
                }
            }
            DistanceMetric::Euclidean => simd::squared_euclidean_simd(a, b).sqrt(),
            DistanceMetric::Manhattan => simd::manhattan_simd(a, b),
        }
    }

    /// Get the name of this distance metric.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Manhattan => "manhattan",
        }
    }

    /// The query operator symbol bound to this metric.
    pub fn operator(&self) -> DistanceOperator {
        match self {
            DistanceMetric::Cosine => DistanceOperator::Cosine,
            DistanceMetric::Euclidean => DistanceOperator::Euclidean,
            DistanceMetric::Manhattan => DistanceOperator::Manhattan,
        }
    }

    /// Parse a distance metric from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "manhattan" | "l1" => Ok(DistanceMetric::Manhattan),
            _ => Err(VectraError::invalid_metric(format!(
                "Unknown distance metric: {s}"
            ))),
        }
    }

    /// Calculate distance between a query vector and multiple vectors in parallel.
    pub fn batch_distance_parallel(&self, query: &[f32], vectors: &[&[f32]]) -> Result<Vec<f32>> {
        if vectors.is_empty() {
            return Ok(Vec::new());
        }

        if vectors.len() < 100 {
            return vectors
                .iter()
                .map(|v| self.distance(query, v))
                .collect::<Result<Vec<_>>>();
        }

        vectors
            .par_iter()
            .map(|v| self.distance(query, v))
            .collect::<Result<Vec<_>>>()
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = VectraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_str(s)
    }
}

/// Infix distance operators recognised by the query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceOperator {
    /// `<->`
    Euclidean,
    /// `<=>`
    Cosine,
    /// `<+>`
    Manhattan,
}

impl DistanceOperator {
    /// All operators, in symbol order.
    pub const ALL: [DistanceOperator; 3] = [
        DistanceOperator::Euclidean,
        DistanceOperator::Cosine,
        DistanceOperator::Manhattan,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            DistanceOperator::Euclidean => "<->",
            DistanceOperator::Cosine => "<=>",
            DistanceOperator::Manhattan => "<+>",
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        match self {
            DistanceOperator::Euclidean => DistanceMetric::Euclidean,
            DistanceOperator::Cosine => DistanceMetric::Cosine,
            DistanceOperator::Manhattan => DistanceMetric::Manhattan,
        }
    }

    /// Resolve an operator from its symbol.
    pub fn from_symbol(symbol: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.symbol() == symbol.trim())
            .ok_or_else(|| VectraError::invalid_metric(format!("Unknown operator: {symbol}")))
    }

    /// Evaluate `lhs <op> rhs`.
    pub fn apply(&self, lhs: &[f32], rhs: &[f32]) -> Result<f32> {
        self.metric().distance(lhs, rhs)
    }
}

impl fmt::Display for DistanceOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Scalar `vector_distance(v1, v2, metric)` function for the query engine.
pub fn vector_distance(v1: &[f32], v2: &[f32], metric: &str) -> Result<f32> {
    DistanceMetric::parse_str(metric)?.distance(v1, v2)
}

/// Scalar `vector_norm(v)` function for the query engine.
pub fn vector_norm(v: &[f32]) -> f32 {
    simd::vector_magnitude_simd(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        let d = DistanceMetric::Euclidean
            .distance(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(d, 1.0);

        let d = DistanceMetric::Euclidean
            .distance(&[1.0, 2.0], &[4.0, 6.0])
            .unwrap();
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_manhattan_distance() {
        let d = DistanceMetric::Manhattan
            .distance(&[1.0, -2.0, 3.0], &[0.0, 2.0, 1.0])
            .unwrap();
        assert!((d - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_scaled_copy_never_negative() {
        let mut state = 0x2545_f491_u32;
        for _ in 0..500 {
            let v: Vec<f32> = (0..17)
                .map(|_| {
                    state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                    (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
                })
                .collect();
            let scaled: Vec<f32> = v.iter().map(|x| x * 3.0).collect();
            let d = DistanceMetric::Cosine.distance(&v, &scaled).unwrap();
            assert!(d >= 0.0, "negative cosine distance {d}");
            assert!(d < 1e-5);
        }
    }

    #[test]
    fn test_cosine_distance() {
        let orthogonal = DistanceMetric::Cosine
            .distance(&[1.0, 0.0], &[0.0, 1.0])
            .unwrap();
        assert!((orthogonal - 1.0).abs() < 1e-6);

        let same = DistanceMetric::Cosine
            .distance(&[2.0, 2.0], &[1.0, 1.0])
            .unwrap();
        assert!(same.abs() < 1e-6);

        let opposite = DistanceMetric::Cosine
            .distance(&[1.0, 0.0], &[-1.0, 0.0])
            .unwrap();
        assert!((opposite - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_sentinel() {
        let d = vector_distance(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], "cosine").unwrap();
        assert_eq!(d, 1.0);
        assert!(!d.is_nan());

        let d = DistanceMetric::Cosine
            .distance(&[0.0, 0.0], &[0.0, 0.0])
            .unwrap();
        assert_eq!(d, ZERO_VECTOR_COSINE_DISTANCE);
    }

    #[test]
    fn test_metrics_are_symmetric() {
        let a = [0.3, -1.2, 4.5, 0.0, 2.2];
        let b = [1.1, 0.4, -0.5, 3.3, 0.9];
        for metric in [
            DistanceMetric::Cosine,
            DistanceMetric::Euclidean,
            DistanceMetric::Manhattan,
        ] {
            assert_eq!(
                metric.distance(&a, &b).unwrap(),
                metric.distance(&b, &a).unwrap(),
                "{metric} should be symmetric"
            );
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = DistanceMetric::Euclidean
            .distance(&[1.0, 2.0], &[1.0])
            .unwrap_err();
        assert!(matches!(
            err,
            VectraError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_parse_metric() {
        assert_eq!(
            DistanceMetric::parse_str("Cosine").unwrap(),
            DistanceMetric::Cosine
        );
        assert_eq!(
            "l2".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::Euclidean
        );
        assert_eq!(
            DistanceMetric::parse_str("l1").unwrap(),
            DistanceMetric::Manhattan
        );
        assert!(matches!(
            DistanceMetric::parse_str("hamming"),
            Err(VectraError::InvalidMetric(_))
        ));
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            DistanceOperator::from_symbol("<->").unwrap().metric(),
            DistanceMetric::Euclidean
        );
        assert_eq!(
            DistanceOperator::from_symbol("<=>").unwrap().metric(),
            DistanceMetric::Cosine
        );
        assert_eq!(
            DistanceOperator::from_symbol("<+>").unwrap().metric(),
            DistanceMetric::Manhattan
        );
        assert!(DistanceOperator::from_symbol("<#>").is_err());

        for metric in [
            DistanceMetric::Cosine,
            DistanceMetric::Euclidean,
            DistanceMetric::Manhattan,
        ] {
            assert_eq!(metric.operator().metric(), metric);
        }

        let d = DistanceOperator::Manhattan
            .apply(&[0.0, 0.0], &[1.0, 1.0])
            .unwrap();
        assert_eq!(d, 2.0);
    }

    #[test]
    fn test_vector_norm() {
        assert!((vector_norm(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(vector_norm(&[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_batch_distance_parallel() {
        let query = [0.0_f32, 0.0];
        let owned: Vec<Vec<f32>> = (0..150).map(|i| vec![i as f32, 0.0]).collect();
        let refs: Vec<&[f32]> = owned.iter().map(|v| v.as_slice()).collect();

        let distances = DistanceMetric::Euclidean
            .batch_distance_parallel(&query, &refs)
            .unwrap();
        assert_eq!(distances.len(), 150);
        assert_eq!(distances[0], 0.0);
        assert_eq!(distances[149], 149.0);
    }
}
