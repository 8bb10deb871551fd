//! Training configuration for the SOM engine.
//!
//! The configuration is plain data with `serde` derives so that any loader
//! (command line, TOML, JSON) can produce it. Call [`SomConfig::validate`]
//! before handing it to a trainer; the trainer does this on construction.

use crate::distance::Metric;
use crate::error::{Result, SomError};
use crate::som::{Decay, Topology};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Self-Organizing Map training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SomConfig {
    /// Number of columns in the grid.
    /// Default: 32.
    pub width: usize,

    /// Number of rows in the grid.
    /// Default: 32.
    pub height: usize,

    /// Dimensionality of the weight vectors (and of every input vector).
    /// Default: 3.
    pub node_dimensionality: usize,

    /// Grid topology used for neighborhood distances.
    /// Default: hexagonal.
    pub topology: Topology,

    /// Distance metric used to score cells against an input.
    /// Default: Euclidean.
    pub metric: Metric,

    /// Learning rate on the first iteration.
    /// Default: 0.5.
    pub initial_learning_rate: f32,

    /// Learning rate floor reached on the final iteration.
    /// Default: 0.01.
    pub final_learning_rate: f32,

    /// Neighborhood radius on the first iteration, in grid steps.
    /// Default: 16 (half of the larger grid side).
    pub initial_radius: f32,

    /// Neighborhood radius floor reached on the final iteration.
    /// Default: 0.5.
    pub final_radius: f32,

    /// Shape of the learning rate and radius decay.
    /// Default: exponential.
    pub decay: Decay,

    /// Maximum number of training iterations.
    /// Default: 10,000.
    pub max_iterations: usize,

    /// How the next input is drawn from the corpus.
    /// Default: shuffled epochs.
    pub sampling: SamplingOrder,

    /// How initial weights are produced.
    /// Default: uniform in [0, 1).
    pub initialization: Initialization,

    /// Optional early stop on a small BMU distance.
    /// Default: None.
    pub convergence: Option<ConvergenceConfig>,

    /// Count a cell as activated when its neighborhood weight reaches this
    /// value. `None` marks only the winner.
    /// Default: None.
    pub soft_activation_threshold: Option<f32>,

    /// Deadline for the device work of a single iteration, in milliseconds.
    /// Default: None (wait indefinitely).
    pub kernel_timeout_ms: Option<u64>,

    /// Refresh the host grid and notify the observer every N iterations.
    /// 0 disables checkpoints.
    /// Default: 0.
    pub checkpoint_interval: usize,

    /// Emit a progress log line every N iterations. 0 disables it.
    /// Default: 1,000.
    pub log_interval: usize,

    /// Circumradius of a rendered cell, in pixels.
    /// Default: 10.
    pub cell_radius: f32,

    /// Random seed for initialization and sampling order.
    /// Default: None (random).
    pub seed: Option<u64>,
}

impl Default for SomConfig {
    fn default() -> Self {
        Self {
            width: 32,
            height: 32,
            node_dimensionality: 3,
            topology: Topology::Hexagonal,
            metric: Metric::Euclidean,
            initial_learning_rate: 0.5,
            final_learning_rate: 0.01,
            initial_radius: 16.0,
            final_radius: 0.5,
            decay: Decay::Exponential,
            max_iterations: 10_000,
            sampling: SamplingOrder::Shuffled,
            initialization: Initialization::default(),
            convergence: None,
            soft_activation_threshold: None,
            kernel_timeout_ms: None,
            checkpoint_interval: 0,
            log_interval: 1_000,
            cell_radius: 10.0,
            seed: None,
        }
    }
}

impl SomConfig {
    /// Returns the total number of cells in the grid.
    #[inline]
    pub fn total_cells(&self) -> usize {
        self.width * self.height
    }

    /// Returns the per-iteration device deadline, if any.
    pub fn kernel_timeout(&self) -> Option<Duration> {
        self.kernel_timeout_ms.map(Duration::from_millis)
    }

    /// Checks the configuration for inconsistencies.
    pub fn validate(&self) -> Result<()> {
        if self.total_cells() == 0 {
            return Err(SomError::EmptyGrid);
        }
        if self.node_dimensionality == 0 {
            return Err(SomError::Config("node dimensionality must be positive".to_string()));
        }
        if self.max_iterations == 0 {
            return Err(SomError::Config("max_iterations must be positive".to_string()));
        }

        let (lr0, lr1) = (self.initial_learning_rate, self.final_learning_rate);
        if !(lr1 > 0.0 && lr1 <= lr0 && lr0 <= 1.0) {
            return Err(SomError::Config(format!(
                "learning rates must satisfy 0 < final ({}) <= initial ({}) <= 1",
                lr1, lr0
            )));
        }

        let (r0, r1) = (self.initial_radius, self.final_radius);
        if !(r1 >= 0.0 && r1 <= r0 && r0.is_finite()) {
            return Err(SomError::Config(format!(
                "radii must satisfy 0 <= final ({}) <= initial ({})",
                r1, r0
            )));
        }
        if self.decay != Decay::Linear && r1 == 0.0 && r0 > 0.0 {
            return Err(SomError::Config(format!(
                "{:?} decay cannot reach a zero radius; use linear decay",
                self.decay
            )));
        }

        if let Some(conv) = &self.convergence {
            if conv.patience == 0 || !(conv.threshold >= 0.0) {
                return Err(SomError::Config(format!(
                    "convergence needs patience > 0 and threshold >= 0 (got {} / {})",
                    conv.patience, conv.threshold
                )));
            }
        }

        if let Some(tau) = self.soft_activation_threshold {
            if !(tau > 0.0 && tau <= 1.0) {
                return Err(SomError::Config(format!(
                    "soft activation threshold {} outside (0, 1]",
                    tau
                )));
            }
        }

        if !(self.cell_radius > 0.0) {
            return Err(SomError::Config("cell_radius must be positive".to_string()));
        }

        if let Initialization::Uniform { low, high } = self.initialization {
            if !(low < high) {
                return Err(SomError::Config(format!(
                    "uniform initialization needs low < high (got {} / {})",
                    low, high
                )));
            }
        }
        if let Initialization::Normal { std_dev, .. } = self.initialization {
            if !(std_dev > 0.0) {
                return Err(SomError::Config("normal initialization needs std_dev > 0".to_string()));
            }
        }

        Ok(())
    }
}

/// Order in which training inputs are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingOrder {
    /// Fixed pass over the corpus, wrapping around at the end.
    Sequential,
    /// Epoch-based pass, reshuffled at the start of every epoch.
    Shuffled,
    /// Independent uniform draw with replacement each iteration.
    RandomWithReplacement,
}

/// Initial weight generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Initialization {
    /// Uniform in `[low, high)`.
    Uniform {
        /// Inclusive lower bound.
        low: f32,
        /// Exclusive upper bound.
        high: f32,
    },
    /// Normal distribution.
    Normal {
        /// Mean.
        mean: f32,
        /// Standard deviation.
        std_dev: f32,
    },
    /// Copy randomly chosen training samples into the cells.
    Samples,
}

impl Default for Initialization {
    fn default() -> Self {
        Initialization::Uniform { low: 0.0, high: 1.0 }
    }
}

/// Early stopping on the best-matching distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// BMU distance below which an iteration counts as converged.
    pub threshold: f32,
    /// Consecutive converged iterations required to stop.
    pub patience: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SomConfig::default();
        assert_eq!(config.total_cells(), 1024);
        assert!(config.validate().is_ok());
        assert!(config.kernel_timeout().is_none());
    }

    #[test]
    fn test_empty_grid_rejected() {
        let config = SomConfig {
            width: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SomError::EmptyGrid)));
    }

    #[test]
    fn test_learning_rate_bounds() {
        let config = SomConfig {
            initial_learning_rate: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SomError::Config(_))));

        let config = SomConfig {
            final_learning_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SomError::Config(_))));
    }

    #[test]
    fn test_exponential_zero_radius_rejected() {
        let config = SomConfig {
            final_radius: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SomConfig {
            final_radius: 0.0,
            decay: Decay::Linear,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_convergence_validation() {
        let config = SomConfig {
            convergence: Some(ConvergenceConfig {
                threshold: 0.1,
                patience: 0,
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_kernel_timeout() {
        let config = SomConfig {
            kernel_timeout_ms: Some(250),
            ..Default::default()
        };
        assert_eq!(config.kernel_timeout(), Some(Duration::from_millis(250)));
    }
}
