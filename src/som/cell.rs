//! Cell representation for the Self-Organizing Map.

use rand::Rng;
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};

/// Number of corners in a cell's rendering polygon.
pub const CORNER_COUNT: usize = 6;

/// A cell in the Self-Organizing Map.
///
/// Each cell has a position on the 2D grid, a weight vector (its prototype),
/// the distance computed against the most recent input, an activation
/// counter, and the corner geometry a renderer draws it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Row position on the grid.
    pub row: usize,
    /// Column position on the grid.
    pub col: usize,
    /// Prototype vector.
    pub weights: Vec<f32>,
    /// Distance to the input of the iteration that produced it.
    pub distance: f32,
    /// Number of iterations in which this cell was activated.
    ///
    /// Accumulates across the whole run rather than describing the latest
    /// iteration alone. Only [`Grid::reset_activity`](crate::Grid::reset_activity),
    /// which training calls at start, sets it back to zero.
    pub state: u32,
    /// Polygon corners as interleaved `(x, y)` pixel coordinates.
    pub corners: [f32; CORNER_COUNT * 2],
}

impl Cell {
    /// Creates a new cell with weights drawn from `dist`.
    pub fn new_random<R: Rng, D: Distribution<f32>>(
        row: usize,
        col: usize,
        weight_dim: usize,
        dist: &D,
        rng: &mut R,
    ) -> Self {
        let weights: Vec<f32> = (0..weight_dim).map(|_| dist.sample(rng)).collect();
        Self::new_with_weights(row, col, weights)
    }

    /// Creates a new cell with zero weights.
    pub fn new_zeros(row: usize, col: usize, weight_dim: usize) -> Self {
        Self::new_with_weights(row, col, vec![0.0; weight_dim])
    }

    /// Creates a new cell with the given weights.
    pub fn new_with_weights(row: usize, col: usize, weights: Vec<f32>) -> Self {
        Self {
            row,
            col,
            weights,
            distance: 0.0,
            state: 0,
            corners: [0.0; CORNER_COUNT * 2],
        }
    }

    /// Returns the 1D index for this cell in a grid of the given width.
    #[inline]
    pub fn index(&self, width: usize) -> usize {
        self.row * width + self.col
    }

    /// True once the cell has been activated at least once.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state > 0
    }

    /// Returns corner `i` as an `(x, y)` pair.
    #[inline]
    pub fn corner(&self, i: usize) -> (f32, f32) {
        (self.corners[2 * i], self.corners[2 * i + 1])
    }

    /// Centroid of the corner polygon.
    pub fn center(&self) -> (f32, f32) {
        let (sx, sy) = (0..CORNER_COUNT)
            .map(|i| self.corner(i))
            .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
        (sx / CORNER_COUNT as f32, sy / CORNER_COUNT as f32)
    }
}

/// Moves one weight row towards `input` by `influence`.
///
/// A zero influence leaves the row bit-identical. Returns whether the row
/// was written.
#[inline]
pub(crate) fn pull_towards(weights: &mut [f32], input: &[f32], influence: f32) -> bool {
    if influence == 0.0 {
        return false;
    }
    for (w, x) in weights.iter_mut().zip(input) {
        *w += influence * (x - *w);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::Normal;

    #[test]
    fn test_cell_creation() {
        let cell = Cell::new_zeros(5, 10, 100);
        assert_eq!(cell.row, 5);
        assert_eq!(cell.col, 10);
        assert_eq!(cell.weights.len(), 100);
        assert!(cell.weights.iter().all(|&w| w == 0.0));
        assert!(!cell.is_active());
    }

    #[test]
    fn test_random_initialization() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let normal = Normal::new(0.0f32, 0.1).unwrap();
        let cell = Cell::new_random(0, 0, 100, &normal, &mut rng);
        assert_eq!(cell.weights.len(), 100);
        assert!(cell.weights.iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_index() {
        let cell = Cell::new_zeros(5, 10, 4);
        assert_eq!(cell.index(32), 5 * 32 + 10);
    }

    #[test]
    fn test_pull_towards() {
        let mut weights = vec![0.0f32, 0.0, 0.0];
        assert!(pull_towards(&mut weights, &[1.0, 1.0, 1.0], 0.5));
        assert!((weights[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_zero_influence_is_exact() {
        let original = vec![0.1f32, 0.7, 1e-30];
        let mut weights = original.clone();
        assert!(!pull_towards(&mut weights, &[f32::MAX, -3.0, 9.0], 0.0));
        assert_eq!(weights, original);
    }

    #[test]
    fn test_center() {
        let mut cell = Cell::new_zeros(0, 0, 1);
        cell.corners = [0.0, 0.0, 2.0, 0.0, 2.0, 2.0, 2.0, 2.0, 0.0, 2.0, 0.0, 0.0];
        let (cx, cy) = cell.center();
        assert!((cx - 1.0).abs() < 1e-6);
        assert!((cy - 1.0).abs() < 1e-6);
    }
}
