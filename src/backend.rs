//! Compute backends driven by the training loop.
//!
//! A backend owns the device-side copy of the grid for the duration of a run.
//! [`GpuBackend`](crate::accel::GpuBackend) is the production implementation;
//! [`ReferenceBackend`] runs the same three stages on the host with rayon and
//! serves as the test oracle and as the fallback when no adapter exists.

use crate::distance::{self, DistanceKernel, Metric};
use crate::error::{Result, SomError};
use crate::som::bmu::{self, Bmu};
use crate::som::{neighborhood, pull_towards, Grid, Topology};
use log::warn;
use rayon::prelude::*;
use std::fmt;
use std::time::Duration;

/// One phase of a training iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Per-cell distance to the current input.
    DistanceCompute,
    /// Minimum reduction over the distance buffer.
    BmuReduce,
    /// Neighborhood-weighted weight update and state marking.
    WeightUpdate,
    /// Host-side schedule step, sampling and convergence bookkeeping.
    ScheduleAdvance,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DistanceCompute => "distance compute",
            Stage::BmuReduce => "BMU reduce",
            Stage::WeightUpdate => "weight update",
            Stage::ScheduleAdvance => "schedule advance",
        };
        f.write_str(name)
    }
}

/// A failure tagged with the stage it happened in.
#[derive(Debug)]
pub struct StageError {
    /// Stage that failed.
    pub stage: Stage,
    /// Underlying failure.
    pub error: SomError,
}

impl StageError {
    /// Tags an error with its stage.
    pub fn new(stage: Stage, error: impl Into<SomError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }

    /// Drops the stage tag.
    pub fn into_inner(self) -> SomError {
        self.error
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.error)
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Parameters of one weight update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateParams {
    /// Learning rate α(t).
    pub learning_rate: f32,
    /// Neighborhood radius σ(t).
    pub radius: f32,
    /// Neighborhood weight at which non-winning cells also count as activated.
    /// Values `<= 0` disable soft activation.
    pub soft_threshold: Option<f32>,
}

impl UpdateParams {
    /// Creates parameters without soft activation.
    pub fn new(learning_rate: f32, radius: f32) -> Self {
        Self {
            learning_rate,
            radius,
            soft_threshold: None,
        }
    }

    /// Rejects negative or non-finite schedule values.
    pub fn check(&self) -> Result<()> {
        let ok = |v: f32| v.is_finite() && v >= 0.0;
        if !ok(self.learning_rate) || !ok(self.radius) {
            return Err(SomError::ScheduleUnderflow {
                learning_rate: self.learning_rate,
                radius: self.radius,
            });
        }
        Ok(())
    }

    /// Whether a cell with neighborhood weight `h` is marked activated.
    #[inline]
    pub(crate) fn marks(&self, is_winner: bool, h: f32) -> bool {
        is_winner || self.soft_threshold.is_some_and(|tau| tau > 0.0 && h >= tau)
    }
}

/// Executes training iterations against a device-resident copy of a grid.
pub trait ComputeBackend {
    /// Human-readable backend description for logs.
    fn describe(&self) -> String;

    /// Uploads the grid, replacing any previously loaded state.
    fn load(&mut self, grid: &Grid) -> Result<()>;

    /// Runs distance, reduction and update for one input.
    ///
    /// The returned [`Bmu`] is the winner the update was centred on. With a
    /// deadline, device work that has not completed in time fails with
    /// [`SomError::DeviceTimeout`] naming the first incomplete stage.
    fn step(
        &mut self,
        input: &[f32],
        params: &UpdateParams,
        deadline: Option<Duration>,
    ) -> std::result::Result<Bmu, StageError>;

    /// Copies weights, distances and states of the last completed
    /// iteration into `grid`.
    ///
    /// With a deadline, a readback that has not completed in time fails with
    /// [`SomError::DeviceTimeout`] and leaves `grid` untouched.
    fn store(&mut self, grid: &mut Grid, deadline: Option<Duration>) -> Result<()>;
}

impl<B: ComputeBackend + ?Sized> ComputeBackend for Box<B> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn load(&mut self, grid: &Grid) -> Result<()> {
        (**self).load(grid)
    }

    fn step(
        &mut self,
        input: &[f32],
        params: &UpdateParams,
        deadline: Option<Duration>,
    ) -> std::result::Result<Bmu, StageError> {
        (**self).step(input, params, deadline)
    }

    fn store(&mut self, grid: &mut Grid, deadline: Option<Duration>) -> Result<()> {
        (**self).store(grid, deadline)
    }
}

/// Picks the GPU backend when an adapter exists, the host reference otherwise.
pub fn default_backend(metric: Metric) -> Result<Box<dyn ComputeBackend>> {
    #[cfg(feature = "gpu")]
    if crate::accel::GpuBackend::is_available() {
        return Ok(Box::new(crate::accel::GpuBackend::new(metric)?));
    }
    warn!("No GPU adapter available, training on the host reference backend");
    Ok(Box::new(ReferenceBackend::new(metric)))
}

/// Host implementation of every stage, parallelised with rayon.
///
/// Work runs synchronously, so deadlines never expire here.
pub struct ReferenceBackend {
    kernel: &'static dyn DistanceKernel,
    width: usize,
    height: usize,
    dim: usize,
    topology: Topology,
    weights: Vec<f32>,
    distances: Vec<f32>,
    states: Vec<u32>,
}

impl ReferenceBackend {
    /// Creates an empty backend scoring cells with `metric`.
    pub fn new(metric: Metric) -> Self {
        Self {
            kernel: metric.kernel(),
            width: 0,
            height: 0,
            dim: 0,
            topology: Topology::Rectangular,
            weights: Vec::new(),
            distances: Vec::new(),
            states: Vec::new(),
        }
    }

    fn num_cells(&self) -> usize {
        self.distances.len()
    }

    fn check_loaded(&self) -> Result<()> {
        if self.num_cells() == 0 {
            return Err(SomError::EmptyGrid);
        }
        Ok(())
    }

    fn check_input(&self, input: &[f32]) -> Result<()> {
        if input.len() != self.dim {
            return Err(SomError::DimensionMismatch {
                expected: self.dim,
                actual: input.len(),
            });
        }
        Ok(())
    }

    /// Scores every cell against `input` and keeps the result as the
    /// current distance buffer.
    pub fn compute_distances(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.check_loaded()?;
        self.check_input(input)?;
        self.distances = distance::compute_all(self.kernel, &self.weights, input, self.dim);
        Ok(self.distances.clone())
    }

    /// Finds the minimum of an arbitrary distance buffer.
    pub fn reduce_distances(&self, distances: &[f32]) -> Result<Bmu> {
        bmu::reduce_min(distances)
    }

    /// Moves every cell towards `input` around `winner`.
    pub fn update(&mut self, winner: usize, input: &[f32], params: &UpdateParams) -> Result<()> {
        self.check_loaded()?;
        params.check()?;
        self.check_input(input)?;
        if winner >= self.num_cells() {
            return Err(SomError::IndexOutOfBounds {
                index: winner,
                max: self.num_cells(),
            });
        }

        let (width, height, topology) = (self.width, self.height, self.topology);
        let winner_pos = (winner / width, winner % width);

        self.weights
            .par_chunks_mut(self.dim)
            .zip(self.states.par_iter_mut())
            .enumerate()
            .for_each(|(i, (weights, state))| {
                let d = topology.distance((i / width, i % width), winner_pos, width, height);
                let h = neighborhood(d, params.radius);
                if params.marks(i == winner, h) {
                    *state += 1;
                }

                pull_towards(weights, input, params.learning_rate * h);
            });

        Ok(())
    }
}

impl ComputeBackend for ReferenceBackend {
    fn describe(&self) -> String {
        format!("host reference ({}, {} threads)", self.kernel.name(), rayon::current_num_threads())
    }

    fn load(&mut self, grid: &Grid) -> Result<()> {
        if grid.is_empty() {
            return Err(SomError::EmptyGrid);
        }
        if grid.node_dimensionality() == 0 {
            return Err(SomError::Config("node_dimensionality must be > 0".to_string()));
        }
        self.width = grid.width();
        self.height = grid.height();
        self.dim = grid.node_dimensionality();
        self.topology = grid.topology();
        self.weights = grid.flat_weights();
        self.distances = grid.cells().iter().map(|c| c.distance).collect();
        self.states = grid.cells().iter().map(|c| c.state).collect();
        Ok(())
    }

    fn step(
        &mut self,
        input: &[f32],
        params: &UpdateParams,
        _deadline: Option<Duration>,
    ) -> std::result::Result<Bmu, StageError> {
        params.check().map_err(|e| StageError::new(Stage::WeightUpdate, e))?;

        let distances = self
            .compute_distances(input)
            .map_err(|e| StageError::new(Stage::DistanceCompute, e))?;
        let bmu = self
            .reduce_distances(&distances)
            .map_err(|e| StageError::new(Stage::BmuReduce, e))?;
        self.update(bmu.index, input, params)
            .map_err(|e| StageError::new(Stage::WeightUpdate, e))?;

        Ok(bmu)
    }

    fn store(&mut self, grid: &mut Grid, _deadline: Option<Duration>) -> Result<()> {
        if grid.len() != self.num_cells() || grid.node_dimensionality() != self.dim {
            return Err(SomError::Config("grid shape differs from the loaded grid".to_string()));
        }
        grid.apply_snapshot(&self.weights, &self.distances, &self.states);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_grid() -> Grid {
        Grid::with_weights(
            3,
            1,
            Topology::Rectangular,
            vec![vec![0.0, 0.0], vec![0.5, 0.5], vec![1.0, 1.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::DistanceCompute.to_string(), "distance compute");
        assert_eq!(Stage::WeightUpdate.to_string(), "weight update");
    }

    #[test]
    fn test_update_params_check() {
        assert!(UpdateParams::new(0.5, 0.0).check().is_ok());
        assert!(matches!(
            UpdateParams::new(-0.1, 1.0).check(),
            Err(SomError::ScheduleUnderflow { .. })
        ));
        assert!(UpdateParams::new(0.5, -1.0).check().is_err());
        assert!(UpdateParams::new(f32::NAN, 1.0).check().is_err());
    }

    #[test]
    fn test_step_on_line() {
        let mut grid = line_grid();
        let mut backend = ReferenceBackend::new(Metric::Euclidean);
        backend.load(&grid).unwrap();

        let bmu = backend.step(&[1.0, 1.0], &UpdateParams::new(0.5, 0.0), None).unwrap();
        assert_eq!(bmu.index, 2);
        assert_eq!(bmu.value, 0.0);

        backend.store(&mut grid, None).unwrap();
        assert_eq!(grid.cells()[0].weights, vec![0.0, 0.0]);
        assert_eq!(grid.cells()[1].weights, vec![0.5, 0.5]);
        assert_eq!(grid.cells()[2].weights, vec![1.0, 1.0]);
        assert_eq!(grid.cells()[2].state, 1);
        assert!((grid.cells()[0].distance - std::f32::consts::SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn test_soft_activation() {
        let grid = line_grid();
        let mut backend = ReferenceBackend::new(Metric::Euclidean);
        backend.load(&grid).unwrap();

        let params = UpdateParams {
            learning_rate: 0.1,
            radius: 1.0,
            soft_threshold: Some(0.5),
        };
        backend.update(2, &[1.0, 1.0], &params).unwrap();
        // h(1) = exp(-0.5) ~ 0.61, h(0) = exp(-2) ~ 0.14
        assert_eq!(backend.states, vec![0, 1, 1]);
    }

    #[test]
    fn test_update_rejects_bad_winner() {
        let grid = line_grid();
        let mut backend = ReferenceBackend::new(Metric::Euclidean);
        backend.load(&grid).unwrap();
        assert!(matches!(
            backend.update(3, &[0.0, 0.0], &UpdateParams::new(0.5, 1.0)),
            Err(SomError::IndexOutOfBounds { index: 3, max: 3 })
        ));
    }

    #[test]
    fn test_step_tags_stage() {
        let grid = line_grid();
        let mut backend = ReferenceBackend::new(Metric::Euclidean);
        backend.load(&grid).unwrap();

        let err = backend.step(&[1.0], &UpdateParams::new(0.5, 1.0), None).unwrap_err();
        assert_eq!(err.stage, Stage::DistanceCompute);
        assert!(matches!(err.error, SomError::DimensionMismatch { expected: 2, actual: 1 }));

        let err = backend.step(&[1.0, 1.0], &UpdateParams::new(-0.5, 1.0), None).unwrap_err();
        assert_eq!(err.stage, Stage::WeightUpdate);
    }

    #[test]
    fn test_tiny_radius_keeps_weights_finite() {
        let mut grid = line_grid();
        let mut backend = ReferenceBackend::new(Metric::Euclidean);
        backend.load(&grid).unwrap();

        let bmu = backend.step(&[0.9, 0.9], &UpdateParams::new(0.5, 1e-30), None).unwrap();
        assert_eq!(bmu.index, 2);

        backend.store(&mut grid, None).unwrap();
        assert_eq!(grid.cells()[0].weights, vec![0.0, 0.0]);
        assert_eq!(grid.cells()[1].weights, vec![0.5, 0.5]);
        assert!((grid.cells()[2].weights[0] - 0.95).abs() < 1e-6);
        assert!(grid.cells().iter().flat_map(|c| &c.weights).all(|w| w.is_finite()));
    }

    #[test]
    fn test_overflowed_distances_pick_first_cell() {
        let backend = ReferenceBackend::new(Metric::Euclidean);
        let bmu = backend.reduce_distances(&vec![f32::INFINITY; 300]).unwrap();
        assert_eq!(bmu.index, 0);
    }

    #[test]
    fn test_unloaded_backend() {
        let mut backend = ReferenceBackend::new(Metric::Manhattan);
        assert!(matches!(backend.compute_distances(&[]), Err(SomError::EmptyGrid)));
    }
}
