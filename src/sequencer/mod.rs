//! Diagnostic sequencing
//!
//! Runs an ordered set of diagnostics and grows the plan with repair steps
//! when a check finds something.

pub mod confirm;
pub mod engine;
pub mod plan;
pub mod summary;

pub use confirm::{AlwaysConfirm, Confirm, NeverConfirm};
pub use engine::{RunSession, Sequencer, SequencerConfig};
pub use plan::{PlannedStep, RunPlan};
pub use summary::{RunSummary, StepReport};
