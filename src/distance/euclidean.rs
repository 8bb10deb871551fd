//! Euclidean (L2) distance.

use crate::distance::DistanceKernel;

/// Euclidean distance: `sqrt(sum((w - x)^2))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl DistanceKernel for Euclidean {
    fn name(&self) -> &'static str {
        "euclidean"
    }

    fn wgsl_declare(&self) -> &'static str {
        "var acc: f32 = 0.0;"
    }

    fn wgsl_accumulate(&self) -> &'static str {
        "let diff = w - x; acc = acc + diff * diff;"
    }

    fn wgsl_finish(&self) -> &'static str {
        "sqrt(acc)"
    }

    #[inline]
    fn distance(&self, weights: &[f32], input: &[f32]) -> f32 {
        weights
            .iter()
            .zip(input)
            .map(|(w, x)| (w - x) * (w - x))
            .sum::<f32>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pythagorean() {
        assert!((Euclidean.distance(&[1.0, 1.0], &[4.0, 5.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_symmetric() {
        let a = [0.1, 0.9, -0.4];
        let b = [1.0, 0.0, 0.3];
        assert_eq!(Euclidean.distance(&a, &b), Euclidean.distance(&b, &a));
    }
}
