//! Runner module - executes one external command at a time.
//!
//! This module provides:
//! - ProcessRunner: spawns the process and tears it down on exit or stop
//! - StreamReader: per-pipe decoding in text or UTF-16LE mode
//! - OutputAggregator: one ordered line feed delivered to the caller's sink
//! - RunHandle: cancellation shared by every worker of a run

mod aggregator;
mod handle;
mod process;
mod reader;

pub use aggregator::{LineSink, OutputAggregator, Poll};
pub use handle::RunHandle;
pub use process::{CommandExecutor, PROMPT, ProcessRunner, RunnerConfig};
pub use reader::StreamReader;
