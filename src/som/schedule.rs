//! Learning rate and neighborhood radius schedules.

use crate::config::SomConfig;
use serde::{Deserialize, Serialize};

/// Shape of the decay from the initial value to the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decay {
    /// `initial * (floor / initial)^p`
    Exponential,
    /// `initial + (floor - initial) * p`
    Linear,
    /// `initial / (1 + k p)`, with `k` chosen so that `p = 1` lands on the floor.
    InverseTime,
}

/// Learning rate and radius in effect for one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleStep {
    /// Zero-based iteration.
    pub iteration: usize,
    /// Learning rate α(t).
    pub learning_rate: f32,
    /// Neighborhood radius σ(t).
    pub radius: f32,
}

/// Monotone schedule for α(t) and σ(t) over a fixed number of iterations.
///
/// Both values start at their initial setting on iteration 0 and reach their
/// floor exactly on iteration `iterations - 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    initial_learning_rate: f32,
    final_learning_rate: f32,
    initial_radius: f32,
    final_radius: f32,
    decay: Decay,
    iterations: usize,
}

impl Schedule {
    /// Creates a schedule from explicit bounds.
    pub fn new(
        learning_rate: (f32, f32),
        radius: (f32, f32),
        decay: Decay,
        iterations: usize,
    ) -> Self {
        Self {
            initial_learning_rate: learning_rate.0,
            final_learning_rate: learning_rate.1,
            initial_radius: radius.0,
            final_radius: radius.1,
            decay,
            iterations,
        }
    }

    /// Creates the schedule described by a training configuration.
    pub fn from_config(config: &SomConfig) -> Self {
        Self::new(
            (config.initial_learning_rate, config.final_learning_rate),
            (config.initial_radius, config.final_radius),
            config.decay,
            config.max_iterations,
        )
    }

    /// Fraction of the schedule elapsed at `iteration`, in `[0, 1]`.
    #[inline]
    pub fn progress(&self, iteration: usize) -> f32 {
        if self.iterations <= 1 {
            return 1.0;
        }
        let last = self.iterations - 1;
        iteration.min(last) as f32 / last as f32
    }

    /// Learning rate at a given iteration.
    #[inline]
    pub fn learning_rate(&self, iteration: usize) -> f32 {
        decay(
            self.decay,
            self.initial_learning_rate,
            self.final_learning_rate,
            self.progress(iteration),
        )
    }

    /// Neighborhood radius at a given iteration.
    #[inline]
    pub fn radius(&self, iteration: usize) -> f32 {
        decay(
            self.decay,
            self.initial_radius,
            self.final_radius,
            self.progress(iteration),
        )
    }

    /// Both values at a given iteration.
    pub fn at(&self, iteration: usize) -> ScheduleStep {
        ScheduleStep {
            iteration,
            learning_rate: self.learning_rate(iteration),
            radius: self.radius(iteration),
        }
    }

    /// Number of iterations the schedule spans.
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

fn decay(shape: Decay, start: f32, floor: f32, p: f32) -> f32 {
    if p >= 1.0 {
        return floor;
    }
    if start == floor || p <= 0.0 {
        return start;
    }

    let value = match shape {
        Decay::Linear => start + (floor - start) * p,
        // Positive floors are enforced by config validation; fall back to
        // linear otherwise.
        Decay::Exponential if start > 0.0 && floor > 0.0 => start * (floor / start).powf(p),
        Decay::InverseTime if start > 0.0 && floor > 0.0 => {
            let k = start / floor - 1.0;
            start / (1.0 + k * p)
        }
        _ => start + (floor - start) * p,
    };

    value.max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(decay: Decay) -> Schedule {
        Schedule::new((0.5, 0.01), (8.0, 1.0), decay, 100)
    }

    #[test]
    fn test_starts_at_initial_and_ends_at_floor() {
        for shape in [Decay::Exponential, Decay::Linear, Decay::InverseTime] {
            let s = schedule(shape);
            assert!((s.learning_rate(0) - 0.5).abs() < 1e-6);
            assert!((s.radius(0) - 8.0).abs() < 1e-6);
            assert_eq!(s.learning_rate(99), 0.01);
            assert_eq!(s.radius(99), 1.0);
            // Past the end stays at the floor.
            assert_eq!(s.radius(500), 1.0);
        }
    }

    #[test]
    fn test_monotone_non_increasing() {
        for shape in [Decay::Exponential, Decay::Linear, Decay::InverseTime] {
            let s = schedule(shape);
            let mut prev = s.at(0);
            for t in 1..100 {
                let step = s.at(t);
                assert!(step.learning_rate <= prev.learning_rate, "{:?} lr at {}", shape, t);
                assert!(step.radius <= prev.radius, "{:?} radius at {}", shape, t);
                assert!(step.learning_rate > 0.0 && step.learning_rate <= 1.0);
                assert!(step.radius >= 0.0);
                prev = step;
            }
        }
    }

    #[test]
    fn test_linear_to_zero_radius() {
        let s = Schedule::new((0.5, 0.1), (4.0, 0.0), Decay::Linear, 5);
        assert_eq!(s.radius(0), 4.0);
        assert!((s.radius(2) - 2.0).abs() < 1e-6);
        assert_eq!(s.radius(4), 0.0);
    }

    #[test]
    fn test_single_iteration_uses_floor() {
        let s = Schedule::new((0.5, 0.1), (4.0, 1.0), Decay::Exponential, 1);
        assert_eq!(s.learning_rate(0), 0.1);
        assert_eq!(s.radius(0), 1.0);
    }

    #[test]
    fn test_constant_schedule() {
        let s = Schedule::new((0.5, 0.5), (0.0, 0.0), Decay::Exponential, 10);
        assert_eq!(s.learning_rate(5), 0.5);
        assert_eq!(s.radius(5), 0.0);
    }
}
