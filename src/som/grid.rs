//! The SOM grid: cells, topology and rendering geometry.

use crate::config::{Initialization, SomConfig};
use crate::error::{Result, SomError};
use crate::som::cell::CORNER_COUNT;
use crate::som::Cell;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Uniform};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const SQRT_3: f32 = 1.732_050_8;

/// Default circumradius of a rendered cell, in pixels.
pub const DEFAULT_CELL_RADIUS: f32 = 10.0;

/// How grid coordinates are connected for neighborhood distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    /// Square lattice, Euclidean distance between (row, col) positions.
    Rectangular,
    /// Square lattice whose opposite edges wrap around.
    Toroidal,
    /// Hexagonal lattice in odd-row offset layout; distance in hex steps.
    Hexagonal,
}

impl Topology {
    /// Distance between two grid positions on a `width` x `height` grid.
    pub fn distance(&self, a: (usize, usize), b: (usize, usize), width: usize, height: usize) -> f32 {
        match self {
            Topology::Rectangular => {
                let dr = a.0 as f32 - b.0 as f32;
                let dc = a.1 as f32 - b.1 as f32;
                (dr * dr + dc * dc).sqrt()
            }
            Topology::Toroidal => {
                let dr = (a.0 as i64 - b.0 as i64).abs();
                let dc = (a.1 as i64 - b.1 as i64).abs();
                let dr = dr.min(height as i64 - dr) as f32;
                let dc = dc.min(width as i64 - dc) as f32;
                (dr * dr + dc * dc).sqrt()
            }
            Topology::Hexagonal => {
                let (ax, az) = offset_to_axial(a);
                let (bx, bz) = offset_to_axial(b);
                let dx = ax - bx;
                let dz = az - bz;
                let dy = -dx - dz;
                ((dx.abs() + dy.abs() + dz.abs()) / 2) as f32
            }
        }
    }

    /// Numeric code shared with the update shader.
    #[cfg(feature = "gpu")]
    #[inline]
    pub(crate) fn code(&self) -> u32 {
        match self {
            Topology::Rectangular => 0,
            Topology::Toroidal => 1,
            Topology::Hexagonal => 2,
        }
    }
}

/// Odd-row offset coordinates to axial (x, z).
#[inline]
fn offset_to_axial((row, col): (usize, usize)) -> (i64, i64) {
    let row = row as i64;
    let col = col as i64;
    (col - (row - (row & 1)) / 2, row)
}

/// Gaussian neighborhood weight for a topological distance.
///
/// The winner itself always gets 1. When `2 * radius^2` is zero or not
/// finite (including radii small enough to underflow) this is the
/// indicator of the winner.
#[inline]
pub fn neighborhood(topo_distance: f32, radius: f32) -> f32 {
    if topo_distance == 0.0 {
        return 1.0;
    }
    let spread = 2.0 * radius * radius;
    if spread == 0.0 || !spread.is_finite() {
        return 0.0;
    }
    (-(topo_distance * topo_distance) / spread).exp()
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// A width x height grid of cells in row-major order.
///
/// The grid is the host-side view of the map. Trainers refresh it only
/// between fully completed iterations, so a reader never observes a
/// partially applied update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
    height: usize,
    node_dimensionality: usize,
    topology: Topology,
    cell_radius: f32,
    cells: Vec<Cell>,
}

impl Grid {
    /// Creates a grid with randomly initialized weights.
    ///
    /// [`Initialization::Samples`] needs training data; use
    /// [`Grid::from_samples`] for it.
    pub fn new(config: &SomConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = seeded_rng(config.seed);

        match config.initialization {
            Initialization::Uniform { low, high } => {
                let dist = Uniform::new(low, high);
                Ok(Self::from_distribution(config, &dist, &mut rng))
            }
            Initialization::Normal { mean, std_dev } => {
                let dist = Normal::new(mean, std_dev).map_err(|e| SomError::Config(e.to_string()))?;
                Ok(Self::from_distribution(config, &dist, &mut rng))
            }
            Initialization::Samples => Err(SomError::Config(
                "sample initialization needs training data; use Grid::from_samples".to_string(),
            )),
        }
    }

    /// Creates a grid whose cells are copies of randomly chosen samples.
    ///
    /// Falls back to the configured distribution when the configuration
    /// does not ask for sample seeding.
    pub fn from_samples(config: &SomConfig, samples: &[Vec<f32>]) -> Result<Self> {
        if config.initialization != Initialization::Samples {
            return Self::new(config);
        }
        config.validate()?;
        if samples.is_empty() {
            return Err(SomError::EmptyInput("no samples to seed the grid from".to_string()));
        }
        if let Some(bad) = samples.iter().find(|s| s.len() != config.node_dimensionality) {
            return Err(SomError::DimensionMismatch {
                expected: config.node_dimensionality,
                actual: bad.len(),
            });
        }

        let mut rng = seeded_rng(config.seed);
        let mut cells = Vec::with_capacity(config.total_cells());
        for i in 0..config.total_cells() {
            // `samples` is non-empty, so `choose` always yields.
            let sample = samples.choose(&mut rng).cloned().unwrap_or_default();
            cells.push(Cell::new_with_weights(i / config.width, i % config.width, sample));
        }

        Ok(Self::assemble(config.width, config.height, config.topology, config.cell_radius, cells))
    }

    /// Creates a grid with zero weights.
    pub fn new_zeros(width: usize, height: usize, node_dimensionality: usize, topology: Topology) -> Result<Self> {
        if width * height == 0 {
            return Err(SomError::EmptyGrid);
        }
        if node_dimensionality == 0 {
            return Err(SomError::Config("node_dimensionality must be > 0".to_string()));
        }
        let cells = (0..width * height)
            .map(|i| Cell::new_zeros(i / width, i % width, node_dimensionality))
            .collect();
        Ok(Self::assemble(width, height, topology, DEFAULT_CELL_RADIUS, cells))
    }

    /// Creates a grid from explicit weight rows, in row-major cell order.
    pub fn with_weights(width: usize, height: usize, topology: Topology, weights: Vec<Vec<f32>>) -> Result<Self> {
        if width * height == 0 || weights.is_empty() {
            return Err(SomError::EmptyGrid);
        }
        if weights.len() != width * height {
            return Err(SomError::Config(format!(
                "{} weight rows for a {}x{} grid",
                weights.len(),
                width,
                height
            )));
        }
        let dim = weights[0].len();
        if dim == 0 {
            return Err(SomError::Config("node_dimensionality must be > 0".to_string()));
        }
        if let Some(bad) = weights.iter().find(|w| w.len() != dim) {
            return Err(SomError::DimensionMismatch {
                expected: dim,
                actual: bad.len(),
            });
        }

        let cells = weights
            .into_iter()
            .enumerate()
            .map(|(i, w)| Cell::new_with_weights(i / width, i % width, w))
            .collect();
        Ok(Self::assemble(width, height, topology, DEFAULT_CELL_RADIUS, cells))
    }

    fn from_distribution<D: Distribution<f32>>(config: &SomConfig, dist: &D, rng: &mut ChaCha8Rng) -> Self {
        let width = config.width;
        let cells = (0..config.total_cells())
            .map(|i| Cell::new_random(i / width, i % width, config.node_dimensionality, dist, rng))
            .collect();
        Self::assemble(width, config.height, config.topology, config.cell_radius, cells)
    }

    fn assemble(width: usize, height: usize, topology: Topology, cell_radius: f32, cells: Vec<Cell>) -> Self {
        let node_dimensionality = cells.first().map(|c| c.weights.len()).unwrap_or(0);
        let mut grid = Self {
            width,
            height,
            node_dimensionality,
            topology,
            cell_radius,
            cells,
        };
        grid.layout();
        grid
    }

    /// Recomputes the corner geometry of every cell.
    fn layout(&mut self) {
        let topology = self.topology;
        let r = self.cell_radius;

        self.cells.par_iter_mut().for_each(|cell| {
            let (row, col) = (cell.row as f32, cell.col as f32);
            match topology {
                Topology::Hexagonal => {
                    // Pointy-top hexagons, odd rows shifted half a cell right.
                    let w = SQRT_3 * r;
                    let shift = if cell.row % 2 == 1 { 0.5 } else { 0.0 };
                    let cx = w * (col + shift) + w / 2.0;
                    let cy = 1.5 * r * row + r;
                    for i in 0..CORNER_COUNT {
                        let angle = (60.0 * i as f32 - 30.0).to_radians();
                        cell.corners[2 * i] = cx + r * angle.cos();
                        cell.corners[2 * i + 1] = cy + r * angle.sin();
                    }
                }
                Topology::Rectangular | Topology::Toroidal => {
                    // Squares of side 2r, with edge midpoints on top and bottom.
                    let s = 2.0 * r;
                    let (x0, y0) = (s * col, s * row);
                    let (x1, y1) = (x0 + s, y0 + s);
                    let xm = x0 + r;
                    cell.corners = [x0, y0, xm, y0, x1, y0, x1, y1, xm, y1, x0, y1];
                }
            }
        });
    }

    /// Number of columns.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Length of every weight vector.
    #[inline]
    pub fn node_dimensionality(&self) -> usize {
        self.node_dimensionality
    }

    /// Grid topology.
    #[inline]
    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Circumradius of a rendered cell, in pixels.
    #[inline]
    pub fn cell_radius(&self) -> f32 {
        self.cell_radius
    }

    /// Read-only snapshot of all cells in row-major order.
    #[inline]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Total number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Always false for a constructed grid.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Gets a cell by its 1D index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// Gets a cell by its 2D position.
    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        if row < self.height && col < self.width {
            Some(&self.cells[row * self.width + col])
        } else {
            None
        }
    }

    /// Converts a 1D index to `(row, col)`.
    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize) {
        (index / self.width, index % self.width)
    }

    /// Converts `(row, col)` to a 1D index.
    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// Topological distance between two cells, by index.
    pub fn topological_distance(&self, a: usize, b: usize) -> f32 {
        self.topology
            .distance(self.coords(a), self.coords(b), self.width, self.height)
    }

    /// Iterator over cells that have been activated at least once.
    pub fn active_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| c.is_active())
    }

    /// Bounding box `(width, height)` of the rendered geometry, in pixels.
    pub fn extent(&self) -> (f32, f32) {
        self.cells.iter().fold((0.0f32, 0.0f32), |(w, h), cell| {
            (0..CORNER_COUNT).map(|i| cell.corner(i)).fold((w, h), |(w, h), (x, y)| (w.max(x), h.max(y)))
        })
    }

    /// Rejects an input whose length differs from the grid dimensionality.
    pub fn check_input(&self, input: &[f32]) -> Result<()> {
        if input.len() != self.node_dimensionality {
            return Err(SomError::DimensionMismatch {
                expected: self.node_dimensionality,
                actual: input.len(),
            });
        }
        Ok(())
    }

    /// All weights flattened row-major (`len() * node_dimensionality()`).
    pub fn flat_weights(&self) -> Vec<f32> {
        let mut flat = Vec::with_capacity(self.cells.len() * self.node_dimensionality);
        for cell in &self.cells {
            flat.extend_from_slice(&cell.weights);
        }
        flat
    }

    /// Clears activation counters and distances.
    pub fn reset_activity(&mut self) {
        for cell in &mut self.cells {
            cell.state = 0;
            cell.distance = 0.0;
        }
    }

    /// Replaces per-cell state with a completed snapshot from a backend.
    pub(crate) fn apply_snapshot(&mut self, weights: &[f32], distances: &[f32], states: &[u32]) {
        let dim = self.node_dimensionality;
        debug_assert_eq!(weights.len(), self.cells.len() * dim);
        debug_assert_eq!(distances.len(), self.cells.len());
        debug_assert_eq!(states.len(), self.cells.len());

        for (i, cell) in self.cells.iter_mut().enumerate() {
            cell.weights.copy_from_slice(&weights[i * dim..(i + 1) * dim]);
            cell.distance = distances[i];
            cell.state = states[i];
        }
    }
}
