//! Core vector data structure.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VectraError};
use crate::util::simd;

/// A dense vector representation for similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    /// The vector dimensions as floating point values.
    pub data: Vec<f32>,
}

impl Vector {
    /// Create a new vector with the given dimensions.
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    /// Get the dimensionality of this vector.
    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Calculate the L2 norm (magnitude) of this vector.
    pub fn norm(&self) -> f32 {
        simd::vector_magnitude_simd(&self.data)
    }

    /// Normalize this vector to unit length. Zero vectors are left unchanged.
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for value in &mut self.data {
                *value /= norm;
            }
        }
    }

    /// Get a normalized copy of this vector.
    pub fn normalized(&self) -> Self {
        let mut normalized = self.clone();
        normalized.normalize();
        normalized
    }

    /// Validate that this vector has the expected dimension.
    pub fn validate_dimension(&self, expected_dim: usize) -> Result<()> {
        validate_dimension(&self.data, expected_dim)
    }

    /// Check if this vector contains any NaN or infinite values.
    pub fn is_valid(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }

    /// Parse a comma-separated list such as `"0.1, 0.2, 0.3"`.
    pub fn parse_csv(s: &str) -> Result<Self> {
        let data = s
            .split(',')
            .map(|part| {
                part.trim().parse::<f32>().map_err(|e| {
                    VectraError::invalid_vector(format!("Cannot parse component '{part}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(data))
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Self::new(data)
    }
}

impl AsRef<[f32]> for Vector {
    fn as_ref(&self) -> &[f32] {
        &self.data
    }
}

/// Check a raw slice against the index dimension and reject non-finite values.
pub(crate) fn validate_input(data: &[f32], expected_dim: usize) -> Result<()> {
    validate_dimension(data, expected_dim)?;
    if let Some(pos) = data.iter().position(|x| !x.is_finite()) {
        return Err(VectraError::invalid_vector(format!(
            "component {pos} is not finite"
        )));
    }
    Ok(())
}

fn validate_dimension(data: &[f32], expected_dim: usize) -> Result<()> {
    if data.len() != expected_dim {
        return Err(VectraError::dimension_mismatch(expected_dim, data.len()));
    }
    Ok(())
}
