//! GPU execution of the training stages.
//!
//! # Architecture
//!
//! - [`DeviceContext`] owns the wgpu adapter, device, queue and poller thread
//! - [`GpuBackend`] compiles the distance, reduction and update pipelines and
//!   keeps the grid resident on the device
//! - wgpu selects Vulkan on Linux, Metal on macOS and DX12 on Windows
//!
//! Without the `gpu` feature a stub reports no adapter, and training runs on
//! [`ReferenceBackend`](crate::backend::ReferenceBackend).
//!
//! # Usage
//!
//! ```rust,no_run
//! use kohonen::accel::GpuBackend;
//! use kohonen::{ComputeBackend, Grid, Metric, SomConfig, UpdateParams};
//!
//! if GpuBackend::is_available() {
//!     let config = SomConfig::default();
//!     let grid = Grid::new(&config).unwrap();
//!
//!     let mut gpu = GpuBackend::new(Metric::Euclidean).unwrap();
//!     gpu.load(&grid).unwrap();
//!     let bmu = gpu.step(&[0.2, 0.4, 0.6], &UpdateParams::new(0.5, 4.0), None).unwrap();
//!     println!("winner {} at {}", bmu.index, bmu.value);
//! }
//! ```

#[cfg(feature = "gpu")]
mod device;

#[cfg(feature = "gpu")]
mod reduce;

#[cfg(feature = "gpu")]
mod shaders;

#[cfg(feature = "gpu")]
pub mod gpu;

#[cfg(feature = "gpu")]
pub use device::DeviceContext;

#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;

// Stub when the GPU feature is disabled
#[cfg(not(feature = "gpu"))]
mod stub {
    use crate::backend::{ComputeBackend, Stage, StageError, UpdateParams};
    use crate::distance::Metric;
    use crate::error::{GpuError, Result};
    use crate::som::{Bmu, Grid};
    use std::time::Duration;

    /// Stub backend when the `gpu` feature is disabled.
    pub struct GpuBackend;

    impl GpuBackend {
        /// Check if GPU acceleration is available.
        /// Always returns false when the `gpu` feature is disabled.
        pub fn is_available() -> bool {
            false
        }

        /// Always fails with [`GpuError::NoAdapter`].
        pub fn new(_metric: Metric) -> Result<Self> {
            Err(GpuError::NoAdapter.into())
        }
    }

    impl ComputeBackend for GpuBackend {
        fn describe(&self) -> String {
            "GPU (disabled)".to_string()
        }

        fn load(&mut self, _grid: &Grid) -> Result<()> {
            Err(GpuError::NoAdapter.into())
        }

        fn step(
            &mut self,
            _input: &[f32],
            _params: &UpdateParams,
            _deadline: Option<Duration>,
        ) -> std::result::Result<Bmu, StageError> {
            Err(StageError::new(Stage::DistanceCompute, GpuError::NoAdapter))
        }

        fn store(&mut self, _grid: &mut Grid, _deadline: Option<Duration>) -> Result<()> {
            Err(GpuError::NoAdapter.into())
        }
    }
}

#[cfg(not(feature = "gpu"))]
pub use stub::GpuBackend;
