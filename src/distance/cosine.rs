//! Cosine distance.

use crate::distance::DistanceKernel;

/// Cosine distance: `1 - (w . x) / (|w| |x|)`.
///
/// Defined as 1.0 when either vector has zero norm.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosine;

impl DistanceKernel for Cosine {
    fn name(&self) -> &'static str {
        "cosine"
    }

    fn wgsl_declare(&self) -> &'static str {
        "var dot_wx: f32 = 0.0; var norm_w: f32 = 0.0; var norm_x: f32 = 0.0;"
    }

    fn wgsl_accumulate(&self) -> &'static str {
        "dot_wx = dot_wx + w * x; norm_w = norm_w + w * w; norm_x = norm_x + x * x;"
    }

    fn wgsl_finish(&self) -> &'static str {
        "select(1.0 - dot_wx / (sqrt(norm_w) * sqrt(norm_x)), 1.0, norm_w == 0.0 || norm_x == 0.0)"
    }

    fn distance(&self, weights: &[f32], input: &[f32]) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_w = 0.0f32;
        let mut norm_x = 0.0f32;
        for (w, x) in weights.iter().zip(input) {
            dot += w * x;
            norm_w += w * w;
            norm_x += x * x;
        }

        if norm_w == 0.0 || norm_x == 0.0 {
            return 1.0;
        }
        1.0 - dot / (norm_w.sqrt() * norm_x.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_vectors() {
        let d = Cosine.distance(&[1.0, 2.0], &[2.0, 4.0]);
        assert!(d.abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_vectors() {
        let d = Cosine.distance(&[1.0, 0.0], &[0.0, 3.0]);
        assert!((d - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_opposite_vectors() {
        let d = Cosine.distance(&[1.0, 1.0], &[-1.0, -1.0]);
        assert!((d - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_norm() {
        assert_eq!(Cosine.distance(&[0.0, 0.0], &[1.0, 1.0]), 1.0);
        assert_eq!(Cosine.distance(&[1.0, 1.0], &[0.0, 0.0]), 1.0);
    }
}
