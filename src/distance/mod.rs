//! Distance kernels scoring every cell against an input vector.
//!
//! Each metric is a [`DistanceKernel`]: a host formula plus three WGSL
//! fragments spliced into one shared compute template. The template fixes
//! the bindings and invocation shape, so the reduction and update stages
//! never depend on which metric produced the distance buffer.

mod chebyshev;
mod cosine;
mod euclidean;
mod manhattan;

pub use chebyshev::Chebyshev;
pub use cosine::Cosine;
pub use euclidean::Euclidean;
pub use manhattan::Manhattan;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Workgroup width of the distance shader.
pub const DISTANCE_WORKGROUP_SIZE: u32 = 256;

/// Shared distance shader. One invocation per cell.
///
/// Placeholders:
/// - `{{DECLARE}}`: accumulator declarations
/// - `{{ACCUMULATE}}`: loop body, with `w` and `x` in scope
/// - `{{FINISH}}`: expression for the final distance
const DISTANCE_TEMPLATE: &str = r#"
struct Params {
    num_cells: u32,
    dim: u32,
    _pad0: u32,
    _pad1: u32,
}

@group(0) @binding(0) var<storage, read> input: array<f32>;
@group(0) @binding(1) var<storage, read> weights: array<f32>;
@group(0) @binding(2) var<storage, read_write> distances: array<f32>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let cell = global_id.x;
    if (cell >= params.num_cells) {
        return;
    }

    let base = cell * params.dim;
    {{DECLARE}}
    for (var d: u32 = 0u; d < params.dim; d = d + 1u) {
        let w = weights[base + d];
        let x = input[d];
        {{ACCUMULATE}}
    }

    distances[cell] = {{FINISH}};
}
"#;

/// A per-cell distance between a weight vector and an input vector.
pub trait DistanceKernel: Send + Sync {
    /// Short name used for pipeline labels and logs.
    fn name(&self) -> &'static str;

    /// WGSL declarations run before the per-element loop.
    fn wgsl_declare(&self) -> &'static str;

    /// WGSL statement run once per element, with `w` and `x` bound.
    fn wgsl_accumulate(&self) -> &'static str;

    /// WGSL expression producing the distance from the accumulators.
    fn wgsl_finish(&self) -> &'static str;

    /// Host formula. Must agree with the shader within float tolerance.
    fn distance(&self, weights: &[f32], input: &[f32]) -> f32;

    /// Complete WGSL source for this metric.
    fn shader_source(&self) -> String {
        DISTANCE_TEMPLATE
            .replace("{{DECLARE}}", self.wgsl_declare())
            .replace("{{ACCUMULATE}}", self.wgsl_accumulate())
            .replace("{{FINISH}}", self.wgsl_finish())
    }
}

/// Metric selector carried by the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// L2 distance.
    Euclidean,
    /// L1 distance.
    Manhattan,
    /// L-infinity distance.
    Chebyshev,
    /// One minus cosine similarity.
    Cosine,
}

impl Metric {
    /// Returns the kernel implementing this metric.
    pub fn kernel(&self) -> &'static dyn DistanceKernel {
        match self {
            Metric::Euclidean => &Euclidean,
            Metric::Manhattan => &Manhattan,
            Metric::Chebyshev => &Chebyshev,
            Metric::Cosine => &Cosine,
        }
    }
}

/// Scores every row of a flattened `N x dim` weight matrix on the host.
pub fn compute_all(kernel: &dyn DistanceKernel, weights: &[f32], input: &[f32], dim: usize) -> Vec<f32> {
    weights
        .par_chunks(dim)
        .map(|row| kernel.distance(row, input))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Metric; 4] = [Metric::Euclidean, Metric::Manhattan, Metric::Chebyshev, Metric::Cosine];

    #[test]
    fn test_identical_vectors_are_zero() {
        let v = [0.3, -1.2, 4.0, 0.5];
        for metric in ALL {
            let d = metric.kernel().distance(&v, &v);
            assert!(d.abs() < 1e-6, "{:?} gave {}", metric, d);
        }
    }

    #[test]
    fn test_known_values() {
        let w = [0.0, 0.0];
        let x = [3.0, -4.0];
        assert!((Euclidean.distance(&w, &x) - 5.0).abs() < 1e-6);
        assert!((Manhattan.distance(&w, &x) - 7.0).abs() < 1e-6);
        assert!((Chebyshev.distance(&w, &x) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_shader_source_is_complete() {
        for metric in ALL {
            let src = metric.kernel().shader_source();
            assert!(!src.contains("{{"), "{:?} left a placeholder", metric);
            assert!(src.contains("distances[cell] ="));
        }
    }

    #[test]
    fn test_compute_all() {
        let weights = [0.0, 0.0, 0.5, 0.5, 1.0, 1.0];
        let distances = compute_all(&Euclidean, &weights, &[1.0, 1.0], 2);
        assert_eq!(distances.len(), 3);
        assert!((distances[0] - std::f32::consts::SQRT_2).abs() < 1e-5);
        assert!((distances[1] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
        assert_eq!(distances[2], 0.0);
    }
}
