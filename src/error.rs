//! Error types for healthcheck
//!
//! Centralized error handling using thiserror. Failures inside a single
//! diagnostic step are reported through `ExecutionResult`, not through this type.

use thiserror::Error;

/// All error types that can occur while preparing or driving a run
#[derive(Debug, Error)]
pub enum HealthError {
    /// Command line was empty or whitespace
    #[error("Empty command")]
    EmptyCommand,

    /// Command line could not be split into an argument vector
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Step id is not in the catalog
    #[error("Unknown tool: {0}")]
    UnknownStep(String),

    /// Process could not be started
    #[error("Failed to execute command: {0}")]
    Spawn(String),

    /// Background run worker panicked or was aborted
    #[error("Run worker failed: {0}")]
    Worker(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for healthcheck operations
pub type Result<T> = std::result::Result<T, HealthError>;
