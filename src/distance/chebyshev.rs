//! Chebyshev (L-infinity) distance.

use crate::distance::DistanceKernel;

/// Chebyshev distance: `max(|w - x|)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chebyshev;

impl DistanceKernel for Chebyshev {
    fn name(&self) -> &'static str {
        "chebyshev"
    }

    fn wgsl_declare(&self) -> &'static str {
        "var acc: f32 = 0.0;"
    }

    fn wgsl_accumulate(&self) -> &'static str {
        "acc = max(acc, abs(w - x));"
    }

    fn wgsl_finish(&self) -> &'static str {
        "acc"
    }

    #[inline]
    fn distance(&self, weights: &[f32], input: &[f32]) -> f32 {
        weights
            .iter()
            .zip(input)
            .map(|(w, x)| (w - x).abs())
            .fold(0.0, f32::max)
    }
}
