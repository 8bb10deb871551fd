//! Self-Organizing Map state and training.
//!
//! - **Grid state**: cells, topologies and render geometry (grid.rs, cell.rs)
//! - **Schedules**: learning rate and radius decay (schedule.rs)
//! - **BMU selection**: host reduction shared with the reference backend (bmu.rs)
//! - **Training loop**: stage orchestration over a compute backend (training.rs)

pub mod bmu;
mod cell;
mod grid;
mod schedule;
pub mod training;

pub use bmu::Bmu;
pub use cell::{Cell, CORNER_COUNT};
pub use grid::{neighborhood, Grid, Topology, DEFAULT_CELL_RADIUS};
pub(crate) use cell::pull_towards;
pub(crate) use grid::seeded_rng;
pub use schedule::{Decay, Schedule, ScheduleStep};
pub use training::{CheckpointObserver, Progress, StopHandle, Termination, TrainingLoop, TrainingOutcome};
