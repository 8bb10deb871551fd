//! Manhattan (L1) distance.

use crate::distance::DistanceKernel;

/// Manhattan distance: `sum(|w - x|)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Manhattan;

impl DistanceKernel for Manhattan {
    fn name(&self) -> &'static str {
        "manhattan"
    }

    fn wgsl_declare(&self) -> &'static str {
        "var acc: f32 = 0.0;"
    }

    fn wgsl_accumulate(&self) -> &'static str {
        "acc = acc + abs(w - x);"
    }

    fn wgsl_finish(&self) -> &'static str {
        "acc"
    }

    #[inline]
    fn distance(&self, weights: &[f32], input: &[f32]) -> f32 {
        weights.iter().zip(input).map(|(w, x)| (w - x).abs()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_of_absolute_differences() {
        let d = Manhattan.distance(&[1.0, -2.0, 0.5], &[0.0, 1.0, 0.5]);
        assert!((d - 4.0).abs() < 1e-6);
    }
}
