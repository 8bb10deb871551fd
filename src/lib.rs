//! # Kohonen - GPU Self-Organizing Map training
//!
//! Kohonen trains Self-Organizing Maps with the per-iteration work running
//! as GPU compute kernels.
//!
//! ## Overview
//!
//! A SOM is a grid of cells, each holding a weight vector. Every iteration
//! presents one input vector:
//!
//! 1. **Distance**: every cell scores its weights against the input
//! 2. **Reduce**: a parallel reduction finds the best-matching unit (BMU)
//! 3. **Update**: every cell moves towards the input, weighted by the
//!    learning rate and a Gaussian of its grid distance to the BMU
//!
//! Learning rate and neighborhood radius then decay along a schedule.
//!
//! ## Key Features
//!
//! - **wgpu compute pipelines** for distance, reduction and update
//! - **Pluggable metrics**: Euclidean, Manhattan, Chebyshev, Cosine
//! - **Grid topologies**: rectangular, toroidal and hexagonal
//! - **Deterministic BMU selection**: ties go to the lowest cell index
//! - **Host reference backend** with identical semantics, built on rayon
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kohonen::{Grid, SomConfig, TrainingLoop};
//!
//! let config = SomConfig {
//!     width: 16,
//!     height: 16,
//!     node_dimensionality: 3,
//!     max_iterations: 5_000,
//!     seed: Some(7),
//!     ..Default::default()
//! };
//!
//! let inputs = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
//! let mut grid = Grid::new(&config)?;
//! let mut training = TrainingLoop::with_default_backend(config)?;
//! let outcome = training.train(&mut grid, &inputs)?;
//!
//! println!("{:?} after {} iterations", outcome.termination, outcome.iterations);
//! for cell in grid.active_cells() {
//!     println!("({}, {}) -> {:?}", cell.row, cell.col, cell.weights);
//! }
//! # Ok::<(), kohonen::SomError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`som`] - Grid state, schedules, BMU selection and the training loop
//! - [`distance`] - Distance kernels and their WGSL fragments
//! - [`backend`] - The compute backend seam and the host reference backend
//! - [`accel`] - The wgpu device context and GPU backend

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::needless_return)]

pub mod accel;
pub mod backend;
pub mod config;
pub mod distance;
pub mod error;
pub mod som;

// Re-export commonly used types
pub use backend::{ComputeBackend, ReferenceBackend, Stage, StageError, UpdateParams};
pub use config::{ConvergenceConfig, Initialization, SamplingOrder, SomConfig};
pub use distance::{Chebyshev, Cosine, DistanceKernel, Euclidean, Manhattan, Metric};
pub use error::{GpuError, Result, SomError};
pub use som::{
    Bmu, Cell, Decay, Grid, Progress, Schedule, StopHandle, Termination, Topology, TrainingLoop, TrainingOutcome,
};

// GPU acceleration (requires "gpu" feature)
pub use accel::GpuBackend;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_config_builds_grid() {
        let config = SomConfig {
            seed: Some(3),
            ..Default::default()
        };
        let grid = Grid::new(&config).unwrap();
        assert_eq!(grid.len(), config.total_cells());
    }
}
