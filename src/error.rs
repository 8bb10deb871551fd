//! Error types for the SOM training engine.

use crate::backend::Stage;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the device layer (adapter, compilation, execution).
#[derive(Error, Debug, Clone)]
pub enum GpuError {
    /// No GPU adapter found
    #[error("No GPU adapter found")]
    NoAdapter,

    /// Failed to create device
    #[error("Device creation failed: {0}")]
    DeviceCreation(String),

    /// Shader or pipeline compilation failed
    #[error("Compilation of {label} failed: {message}")]
    Compilation {
        /// Pipeline label.
        label: String,
        /// Diagnostic reported by the device layer.
        message: String,
    },

    /// Validation error raised while recording or submitting work
    #[error("Validation error: {0}")]
    Validation(String),

    /// Buffer mapping failed
    #[error("Buffer mapping failed: {0}")]
    BufferMapping(String),

    /// The device was lost or the poller went away
    #[error("Device lost: {0}")]
    Lost(String),
}

/// The main error type for SOM operations.
#[derive(Error, Debug)]
pub enum SomError {
    /// Input vector length does not match the grid's node dimensionality.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Grid dimensionality.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },

    /// The grid has no cells.
    #[error("Grid has no cells")]
    EmptyGrid,

    /// A distance buffer to reduce has no entries.
    #[error("Distance buffer is empty")]
    EmptyBuffer,

    /// Learning rate or radius went negative.
    #[error("Schedule underflow: learning rate {learning_rate}, radius {radius}")]
    ScheduleUnderflow {
        /// Learning rate handed to the update stage.
        learning_rate: f32,
        /// Neighborhood radius handed to the update stage.
        radius: f32,
    },

    /// Device work did not complete before the deadline.
    #[error("Device timeout after {timeout:?} during {stage}")]
    DeviceTimeout {
        /// First stage that had not completed.
        stage: Stage,
        /// The configured deadline.
        timeout: Duration,
    },

    /// Compilation or execution failure reported by the device layer.
    #[error("Device failure: {0}")]
    DeviceFailure(#[from] GpuError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Empty input.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Index out of bounds.
    #[error("Index out of bounds: {index} >= {max}")]
    IndexOutOfBounds {
        /// The index that was out of bounds.
        index: usize,
        /// The maximum allowed index.
        max: usize,
    },

    /// A stage failed inside the training loop.
    #[error("Iteration {iteration} failed during {stage}: {source}")]
    Iteration {
        /// Zero-based iteration number.
        iteration: usize,
        /// Stage that failed.
        stage: Stage,
        /// Underlying failure.
        #[source]
        source: Box<SomError>,
    },
}

impl SomError {
    /// Strips any loop context and returns the underlying failure.
    pub fn root(&self) -> &SomError {
        match self {
            SomError::Iteration { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if the run may be retried with a fresh device context.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.root(), SomError::DeviceTimeout { .. })
    }
}

/// Result type alias for SOM operations.
pub type Result<T> = std::result::Result<T, SomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_unwraps_context() {
        let err = SomError::Iteration {
            iteration: 7,
            stage: Stage::WeightUpdate,
            source: Box::new(SomError::ScheduleUnderflow {
                learning_rate: -0.1,
                radius: 1.0,
            }),
        };

        assert!(matches!(err.root(), SomError::ScheduleUnderflow { .. }));
        assert!(err.to_string().contains("Iteration 7"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_timeout_is_recoverable() {
        let err = SomError::Iteration {
            iteration: 3,
            stage: Stage::DistanceCompute,
            source: Box::new(SomError::DeviceTimeout {
                stage: Stage::DistanceCompute,
                timeout: Duration::from_millis(5),
            }),
        };
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_gpu_error_converts() {
        let err: SomError = GpuError::NoAdapter.into();
        assert!(matches!(err, SomError::DeviceFailure(GpuError::NoAdapter)));
    }
}
