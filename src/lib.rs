//! Healthcheck - runs Windows maintenance tools and chains repairs.
//!
//! Each diagnostic is launched as an external process with its output streamed
//! line by line to the caller. When a check reports a repairable problem the
//! sequencer asks for confirmation and runs the matching repair next.

pub mod catalog;
pub mod classify;
pub mod domain;
pub mod error;
pub mod progress;
pub mod report;
pub mod runner;
pub mod sequencer;

pub use error::{HealthError, Result};
