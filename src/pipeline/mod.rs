//! Pipelines: a source, transforms and a sink driven as one future.
//!
//! - [`Pipeline`] / [`PipelineBuilder`] - Wiring and the run future
//! - [`Outlet`] / [`Inlet`] - The seams stages are connected through
//! - [`Tee`] - Fan-out to several inlets
//! - [`AbortHandle`] - Cancellation from another task
//! - [`PipelineReport`] / [`PipelineState`] - Outcome and lifecycle

mod abort;
mod hop;
mod meter;
mod run;
mod seam;
mod tee;

pub use abort::AbortHandle;
pub use meter::PipelineReport;
pub use run::{Pipeline, PipelineBuilder, PipelineState};
pub use seam::{Inlet, Outlet};
pub use tee::Tee;
