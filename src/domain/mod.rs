//! Domain types for healthcheck
//!
//! This module contains the core value types shared by the engine:
//! - CommandSpec: what to launch and how its output is encoded
//! - OutputLine / ExecutionResult: what came back
//! - Outcome / ClassificationOutcome: what it means

pub mod command;
pub mod outcome;
pub mod result;

pub use command::{CommandSpec, ExecMode, OutputEncoding};
pub use outcome::{ClassificationOutcome, Outcome};
pub use result::{ERROR_PREFIX, ExecutionResult, OutputLine, StreamSource};
