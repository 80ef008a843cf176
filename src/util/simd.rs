//! SIMD kernels for distance computation using the wide crate.
//!
//! Each kernel processes eight lanes at a time and folds the tail with a
//! scalar loop. Lane sums are reduced in a fixed order, so the result for a
//! given pair of slices is deterministic and symmetric in its arguments.

use wide::f32x8;

#[inline]
fn load(slice: &[f32], start: usize) -> f32x8 {
    f32x8::new([
        slice[start],
        slice[start + 1],
        slice[start + 2],
        slice[start + 3],
        slice[start + 4],
        slice[start + 5],
        slice[start + 6],
        slice[start + 7],
    ])
}

#[inline]
fn horizontal_sum(v: f32x8) -> f32 {
    v.to_array().iter().sum::<f32>()
}

/// Dot product of two equal-length slices.
pub fn dot_product_simd(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut sum = f32x8::splat(0.0);
    let chunks = a.len() / 8;

    for i in 0..chunks {
        let start = i * 8;
        sum += load(a, start) * load(b, start);
    }

    let mut result = horizontal_sum(sum);
    for i in (chunks * 8)..a.len() {
        result += a[i] * b[i];
    }

    result
}

/// Sum of squared per-dimension differences.
pub fn squared_euclidean_simd(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut sum = f32x8::splat(0.0);
    let chunks = a.len() / 8;

    for i in 0..chunks {
        let start = i * 8;
        let diff = load(a, start) - load(b, start);
        sum += diff * diff;
    }

    let mut result = horizontal_sum(sum);
    for i in (chunks * 8)..a.len() {
        let diff = a[i] - b[i];
        result += diff * diff;
    }

    result
}

/// Sum of absolute per-dimension differences.
pub fn manhattan_simd(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut sum = f32x8::splat(0.0);
    let chunks = a.len() / 8;

    for i in 0..chunks {
        let start = i * 8;
        sum += (load(a, start) - load(b, start)).abs();
    }

    let mut result = horizontal_sum(sum);
    for i in (chunks * 8)..a.len() {
        result += (a[i] - b[i]).abs();
    }

    result
}

/// L2 magnitude of a slice.
pub fn vector_magnitude_simd(vector: &[f32]) -> f32 {
    dot_product_simd(vector, vector).sqrt()
}
