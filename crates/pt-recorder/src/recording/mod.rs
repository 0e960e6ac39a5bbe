//! Recording scheduler subsystem
//!
//! Keeps a set of per-recording state machines converged with the desired
//! reservation list delivered by the backend poller:
//! - `Record`: the injected start/stop/is-running capture capability
//! - `RecordController`: autonomous loop driving one recording through its
//!   scheduled window
//! - `Recorder`: reconciles desired-state snapshots against the live
//!   controllers and aggregates terminal-state statistics

pub mod controller;
pub mod recorder;
pub mod types;

pub use controller::RecordController;
pub use recorder::{Recorder, RecordSnapshot};
pub use types::{Record, RecordState, RecorderStats, RecorderStatsHandle};
