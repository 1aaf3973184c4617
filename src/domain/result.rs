//! Captured output and completed-invocation results

use std::time::Duration;

use serde::{Serialize, Serializer};

/// Prefix marking error-tagged lines in the sink and in the accumulated output
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamSource {
    Stdout,
    Stderr,
}

/// A single non-empty decoded line, trailing terminators stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub source: StreamSource,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            source: StreamSource::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            source: StreamSource::Stderr,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.source == StreamSource::Stderr
    }

    /// The line as the sink sees it
    pub fn display(&self) -> String {
        match self.source {
            StreamSource::Stdout => self.text.clone(),
            StreamSource::Stderr => format!("{}{}", ERROR_PREFIX, self.text),
        }
    }
}

/// Outcome of one completed invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Command line as given
    pub command: String,
    /// Process exit code; -1 when it could not be spawned or died by signal
    pub exit_code: i32,
    /// Every captured line in arrival order, newline joined
    pub output: String,
    /// Error-tagged lines only, newline joined
    pub error: String,
    /// exit_code == 0
    pub succeeded: bool,
    /// The run was stopped before the process finished on its own
    pub cancelled: bool,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn new(
        command: impl Into<String>,
        exit_code: i32,
        output: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            exit_code,
            output: output.into(),
            error: error.into(),
            succeeded: exit_code == 0,
            cancelled: false,
            duration: Duration::ZERO,
        }
    }

    /// Result for a process that never started
    pub fn spawn_failure(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(command, -1, "", error)
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn mark_cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    /// Lower-cased output, the form signature phrases are matched against
    pub fn normalized_output(&self) -> String {
        self.output.to_lowercase()
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_line_display_is_prefixed() {
        let line = OutputLine::stderr("Access is denied.");
        assert!(line.is_error());
        assert_eq!(line.display(), "ERROR: Access is denied.");
    }

    #[test]
    fn test_stdout_line_display_is_verbatim() {
        let line = OutputLine::stdout("Verification 100% complete.");
        assert!(!line.is_error());
        assert_eq!(line.display(), "Verification 100% complete.");
    }

    #[test]
    fn test_succeeded_tracks_exit_code() {
        assert!(ExecutionResult::new("dism", 0, "", "").succeeded);
        assert!(!ExecutionResult::new("dism", 87, "", "").succeeded);
    }

    #[test]
    fn test_spawn_failure_shape() {
        let result =
            ExecutionResult::spawn_failure("nosuchtool", "Failed to execute command: not found");
        assert_eq!(result.exit_code, -1);
        assert!(!result.succeeded);
        assert!(result.output.is_empty());
        assert!(result.error.contains("not found"));
    }

    #[test]
    fn test_serializes_duration_as_millis() {
        let result = ExecutionResult::new("sfc /scannow", 0, "ok", "")
            .with_duration(Duration::from_millis(1500));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration_ms"], 1500);
        assert_eq!(json["succeeded"], true);
        assert_eq!(json["cancelled"], false);
    }
}
