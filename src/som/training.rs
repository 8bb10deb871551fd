//! SOM training loop.
//!
//! Each iteration runs Distance → Reduce → Update on a [`ComputeBackend`]
//! and then advances the schedule on the host. The host [`Grid`] is only
//! refreshed between completed iterations (at checkpoints and at the end),
//! so observers never see a half-applied update.

use crate::backend::{self, ComputeBackend, Stage, UpdateParams};
use crate::config::{SamplingOrder, SomConfig};
use crate::error::{Result, SomError};
use crate::som::{Bmu, Grid, Schedule};
use log::{info, trace};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cloneable handle requesting a cooperative stop.
///
/// The loop checks it before every distance stage; work already submitted
/// for the current iteration completes first.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Creates a handle in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why training ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The BMU distance stayed under the threshold for the configured patience.
    Converged,
    /// The iteration budget was used up.
    MaxIterationsReached,
    /// A stop was requested through a [`StopHandle`].
    Cancelled,
}

/// Training progress handed to checkpoint observers.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    /// Completed iterations.
    pub iteration: usize,
    /// Iteration budget.
    pub max_iterations: usize,
    /// Learning rate of the last completed iteration.
    pub learning_rate: f32,
    /// Radius of the last completed iteration.
    pub radius: f32,
    /// Winner of the last completed iteration.
    pub bmu: Bmu,
}

impl Progress {
    /// Fraction of the iteration budget used.
    pub fn fraction(&self) -> f32 {
        self.iteration as f32 / self.max_iterations as f32
    }
}

/// Callback receiving a consistent grid snapshot at checkpoints.
pub type CheckpointObserver = Box<dyn FnMut(&Progress, &Grid) + Send>;

/// Result of a training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingOutcome {
    /// Completed iterations.
    pub iterations: usize,
    /// Why the run ended.
    pub termination: Termination,
    /// Winner of the last completed iteration, if any ran.
    pub last_bmu: Option<Bmu>,
}

/// Picks which training input feeds the next iteration.
struct Sampler {
    order: SamplingOrder,
    indices: Vec<usize>,
    cursor: usize,
}

impl Sampler {
    fn new(order: SamplingOrder, len: usize) -> Self {
        Self {
            order,
            indices: (0..len).collect(),
            cursor: 0,
        }
    }

    fn next(&mut self, rng: &mut ChaCha8Rng) -> usize {
        let len = self.indices.len();
        let position = self.cursor % len;
        self.cursor += 1;

        match self.order {
            SamplingOrder::Sequential => position,
            SamplingOrder::Shuffled => {
                if position == 0 {
                    self.indices.shuffle(rng);
                }
                self.indices[position]
            }
            SamplingOrder::RandomWithReplacement => rng.gen_range(0..len),
        }
    }
}

/// Drives a backend through a full training run.
pub struct TrainingLoop<B: ComputeBackend> {
    config: SomConfig,
    schedule: Schedule,
    backend: B,
    rng: ChaCha8Rng,
    stop: StopHandle,
    observer: Option<CheckpointObserver>,
}

impl TrainingLoop<Box<dyn ComputeBackend>> {
    /// Creates a loop on the GPU when available, the host reference otherwise.
    pub fn with_default_backend(config: SomConfig) -> Result<Self> {
        let backend = backend::default_backend(config.metric)?;
        Self::new(config, backend)
    }
}

impl<B: ComputeBackend> TrainingLoop<B> {
    /// Creates a training loop after validating the configuration.
    pub fn new(config: SomConfig, backend: B) -> Result<Self> {
        config.validate()?;

        // Separate stream from the one that initialises the grid.
        let mut rng = super::seeded_rng(config.seed);
        rng.set_stream(1);

        Ok(Self {
            schedule: Schedule::from_config(&config),
            config,
            backend,
            rng,
            stop: StopHandle::new(),
            observer: None,
        })
    }

    /// Handle that stops the loop from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Registers an observer called every `checkpoint_interval` iterations.
    pub fn on_checkpoint(&mut self, observer: impl FnMut(&Progress, &Grid) + Send + 'static) {
        self.observer = Some(Box::new(observer));
    }

    /// The schedule in use.
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// The backend in use.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Consumes the loop and returns its backend.
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Trains `grid` on `inputs`.
    ///
    /// Activation counters are reset at the start. On error the grid keeps
    /// the state of the last checkpoint (or its initial state).
    pub fn train(&mut self, grid: &mut Grid, inputs: &[Vec<f32>]) -> Result<TrainingOutcome> {
        if inputs.is_empty() {
            return Err(SomError::EmptyInput("no training inputs provided".to_string()));
        }
        if grid.node_dimensionality() != self.config.node_dimensionality {
            return Err(SomError::DimensionMismatch {
                expected: self.config.node_dimensionality,
                actual: grid.node_dimensionality(),
            });
        }
        for input in inputs {
            grid.check_input(input)?;
        }

        grid.reset_activity();
        self.backend.load(grid)?;

        let max_iterations = self.config.max_iterations;
        let timeout = self.config.kernel_timeout();
        let started = Instant::now();

        info!(
            "Starting SOM training: {}x{} grid, {} dims, {} iterations on {} inputs ({})",
            grid.width(),
            grid.height(),
            grid.node_dimensionality(),
            max_iterations,
            inputs.len(),
            self.backend.describe()
        );

        let mut sampler = Sampler::new(self.config.sampling, inputs.len());
        let mut termination = Termination::MaxIterationsReached;
        let mut completed = 0;
        let mut last_bmu = None;
        let mut streak = 0;

        for iteration in 0..max_iterations {
            if self.stop.is_stopped() {
                termination = Termination::Cancelled;
                break;
            }

            let step = self.schedule.at(iteration);
            let params = UpdateParams {
                learning_rate: step.learning_rate,
                radius: step.radius,
                soft_threshold: self.config.soft_activation_threshold,
            };
            let sample = sampler.next(&mut self.rng);

            let bmu = self
                .backend
                .step(&inputs[sample], &params, timeout)
                .map_err(|e| SomError::Iteration {
                    iteration,
                    stage: e.stage,
                    source: Box::new(e.error),
                })?;

            completed = iteration + 1;
            last_bmu = Some(bmu);
            trace!(
                "Iteration {}: input {}, bmu {} at {:.6}, lr={:.4}, radius={:.3}",
                iteration,
                sample,
                bmu.index,
                bmu.value,
                step.learning_rate,
                step.radius
            );

            if let Some(convergence) = &self.config.convergence {
                streak = if bmu.value < convergence.threshold { streak + 1 } else { 0 };
                if streak >= convergence.patience {
                    termination = Termination::Converged;
                }
            }

            if self.config.log_interval > 0 && completed % self.config.log_interval == 0 {
                info!(
                    "Iteration {}/{}: lr={:.4}, radius={:.2}, bmu distance={:.6}",
                    completed, max_iterations, step.learning_rate, step.radius, bmu.value
                );
            }

            let interval = self.config.checkpoint_interval;
            if interval > 0 && completed % interval == 0 {
                if let Some(observer) = self.observer.as_mut() {
                    self.backend.store(grid, timeout).map_err(|e| SomError::Iteration {
                        iteration,
                        stage: Stage::ScheduleAdvance,
                        source: Box::new(e),
                    })?;
                    let progress = Progress {
                        iteration: completed,
                        max_iterations,
                        learning_rate: step.learning_rate,
                        radius: step.radius,
                        bmu,
                    };
                    observer(&progress, grid);
                }
            }

            if termination == Termination::Converged {
                break;
            }
        }

        if completed > 0 {
            self.backend.store(grid, timeout)?;
        }

        info!(
            "SOM training finished: {:?} after {} iterations in {:.2?}",
            termination,
            completed,
            started.elapsed()
        );

        Ok(TrainingOutcome {
            iterations: completed,
            termination,
            last_bmu,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ReferenceBackend;
    use crate::config::ConvergenceConfig;
    use crate::distance::Metric;
    use crate::som::{Decay, Topology};
    use rand::SeedableRng;
    use std::sync::Mutex;

    fn test_config() -> SomConfig {
        SomConfig {
            width: 6,
            height: 5,
            node_dimensionality: 3,
            topology: Topology::Rectangular,
            initial_radius: 3.0,
            final_radius: 0.5,
            max_iterations: 200,
            log_interval: 0,
            seed: Some(42),
            ..Default::default()
        }
    }

    fn inputs() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![1.0, 1.0, 0.0],
        ]
    }

    fn trainer(config: SomConfig) -> TrainingLoop<ReferenceBackend> {
        TrainingLoop::new(config, ReferenceBackend::new(Metric::Euclidean)).unwrap()
    }

    #[test]
    fn test_train_runs_to_budget() {
        let config = test_config();
        let mut grid = Grid::new(&config).unwrap();
        let outcome = trainer(config).train(&mut grid, &inputs()).unwrap();

        assert_eq!(outcome.iterations, 200);
        assert_eq!(outcome.termination, Termination::MaxIterationsReached);
        let activations: u32 = grid.cells().iter().map(|c| c.state).sum();
        assert_eq!(activations, 200);
        assert!(grid.active_cells().count() > 0);
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let config = test_config();
        let mut a = Grid::new(&config).unwrap();
        let mut b = Grid::new(&config).unwrap();
        trainer(config.clone()).train(&mut a, &inputs()).unwrap();
        trainer(config).train(&mut b, &inputs()).unwrap();
        assert_eq!(a.flat_weights(), b.flat_weights());
    }

    #[test]
    fn test_sampler_orders() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let mut sequential = Sampler::new(SamplingOrder::Sequential, 3);
        let picks: Vec<usize> = (0..7).map(|_| sequential.next(&mut rng)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2, 0]);

        // Every epoch of a shuffled sampler is a permutation.
        let mut shuffled = Sampler::new(SamplingOrder::Shuffled, 5);
        for _ in 0..3 {
            let mut epoch: Vec<usize> = (0..5).map(|_| shuffled.next(&mut rng)).collect();
            epoch.sort_unstable();
            assert_eq!(epoch, vec![0, 1, 2, 3, 4]);
        }

        let mut random = Sampler::new(SamplingOrder::RandomWithReplacement, 4);
        assert!((0..50).all(|_| random.next(&mut rng) < 4));
    }

    #[test]
    fn test_cancel_before_start() {
        let config = test_config();
        let mut grid = Grid::new(&config).unwrap();
        let before = grid.flat_weights();

        let mut training = trainer(config);
        training.stop_handle().stop();
        let outcome = training.train(&mut grid, &inputs()).unwrap();

        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.termination, Termination::Cancelled);
        assert!(outcome.last_bmu.is_none());
        assert_eq!(grid.flat_weights(), before);
    }

    #[test]
    fn test_convergence_stops_early() {
        let config = SomConfig {
            convergence: Some(ConvergenceConfig {
                threshold: 0.05,
                patience: 3,
            }),
            initial_learning_rate: 0.9,
            final_learning_rate: 0.5,
            max_iterations: 1_000,
            ..test_config()
        };
        let mut grid = Grid::new(&config).unwrap();
        let outcome = trainer(config).train(&mut grid, &[vec![0.5, 0.5, 0.5]]).unwrap();

        assert_eq!(outcome.termination, Termination::Converged);
        assert!(outcome.iterations < 1_000);
        assert!(outcome.last_bmu.unwrap().value < 0.05);
    }

    #[test]
    fn test_checkpoints() {
        let config = SomConfig {
            checkpoint_interval: 50,
            ..test_config()
        };
        let mut grid = Grid::new(&config).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut training = trainer(config);
        training.on_checkpoint(move |progress, grid| {
            let activations: u32 = grid.cells().iter().map(|c| c.state).sum();
            sink.lock().unwrap().push((progress.iteration, activations));
        });
        training.train(&mut grid, &inputs()).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(50, 50), (100, 100), (150, 150), (200, 200)]);
    }

    #[test]
    fn test_stop_from_observer() {
        let config = SomConfig {
            checkpoint_interval: 10,
            ..test_config()
        };
        let mut grid = Grid::new(&config).unwrap();
        let mut training = trainer(config);
        let stop = training.stop_handle();
        training.on_checkpoint(move |_, _| stop.stop());

        let outcome = training.train(&mut grid, &inputs()).unwrap();
        assert_eq!(outcome.iterations, 10);
        assert_eq!(outcome.termination, Termination::Cancelled);
    }

    #[test]
    fn test_bad_input_fails_before_training() {
        let config = test_config();
        let mut grid = Grid::new(&config).unwrap();
        let before = grid.flat_weights();

        let result = trainer(config).train(&mut grid, &[vec![0.0, 1.0, 0.0], vec![1.0]]);
        assert!(matches!(result, Err(SomError::DimensionMismatch { expected: 3, actual: 1 })));
        assert_eq!(grid.flat_weights(), before);

        let config = test_config();
        let result = trainer(config).train(&mut grid, &[]);
        assert!(matches!(result, Err(SomError::EmptyInput(_))));
    }

    #[test]
    fn test_linear_decay_to_zero_radius() {
        let config = SomConfig {
            decay: Decay::Linear,
            final_radius: 0.0,
            ..test_config()
        };
        let mut grid = Grid::new(&config).unwrap();
        let outcome = trainer(config).train(&mut grid, &inputs()).unwrap();
        assert_eq!(outcome.iterations, 200);
    }
}
