//! Best-matching-unit selection.

use crate::error::{Result, SomError};
use rayon::prelude::*;

/// The cell closest to an input: its index and distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bmu {
    /// Row-major cell index.
    pub index: usize,
    /// Distance between the cell and the input.
    pub value: f32,
}

/// Picks the better of two candidates.
///
/// The smaller value wins; equal values go to the smaller index, which makes
/// the result independent of merge order. NaN ranks as `+inf`.
#[inline]
pub fn merge(a: Bmu, b: Bmu) -> Bmu {
    let (av, bv) = (rank(a.value), rank(b.value));
    if bv < av || (bv == av && b.index < a.index) {
        b
    } else {
        a
    }
}

#[inline]
fn rank(value: f32) -> f32 {
    if value.is_nan() {
        f32::INFINITY
    } else {
        value
    }
}

/// Finds the minimum of a distance buffer on the host.
///
/// NaN distances are reported as `+inf`, the same as the device reduction.
pub fn reduce_min(distances: &[f32]) -> Result<Bmu> {
    if distances.is_empty() {
        return Err(SomError::EmptyBuffer);
    }

    // The identity ranks after every real cell, even one at +inf.
    let bmu = distances
        .par_iter()
        .enumerate()
        .map(|(index, &value)| Bmu {
            index,
            value: rank(value),
        })
        .reduce(
            || Bmu {
                index: usize::MAX,
                value: f32::INFINITY,
            },
            merge,
        );
    Ok(bmu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_min() {
        let bmu = reduce_min(&[3.0, 1.0, 2.0, 5.0]).unwrap();
        assert_eq!(bmu.index, 1);
        assert_eq!(bmu.value, 1.0);
    }

    #[test]
    fn test_ties_go_to_lowest_index() {
        let mut distances = vec![4.0f32; 10_000];
        distances[7_777] = 0.25;
        distances[123] = 0.25;
        distances[9_999] = 0.25;
        for _ in 0..5 {
            let bmu = reduce_min(&distances).unwrap();
            assert_eq!(bmu.index, 123);
        }
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = Bmu { index: 4, value: 1.0 };
        let b = Bmu { index: 2, value: 1.0 };
        assert_eq!(merge(a, b), merge(b, a));
        assert_eq!(merge(a, b).index, 2);
    }

    #[test]
    fn test_empty_buffer() {
        assert!(matches!(reduce_min(&[]), Err(SomError::EmptyBuffer)));
    }

    #[test]
    fn test_saturated_buffer() {
        let bmu = reduce_min(&[f32::MAX, f32::MAX]).unwrap();
        assert_eq!(bmu.index, 0);
    }

    #[test]
    fn test_overflowed_distances_name_a_real_cell() {
        let bmu = reduce_min(&[f32::INFINITY; 300]).unwrap();
        assert_eq!(bmu.index, 0);
        assert_eq!(bmu.value, f32::INFINITY);
    }

    #[test]
    fn test_nan_ranks_as_infinity() {
        let bmu = reduce_min(&[f32::NAN, f32::MAX]).unwrap();
        assert_eq!(bmu.index, 1);

        let bmu = reduce_min(&[f32::NAN, f32::INFINITY, f32::NAN]).unwrap();
        assert_eq!(bmu.index, 0);
        assert_eq!(bmu.value, f32::INFINITY);

        let a = Bmu { index: 0, value: f32::NAN };
        let b = Bmu { index: 1, value: 2.0 };
        assert_eq!(merge(a, b).index, 1);
        assert_eq!(merge(b, a).index, 1);
    }
}
