//! Classification outcome types.
//!
//! Every completed ExecutionResult gets exactly one of these.

use serde::{Deserialize, Serialize};

/// Four-way verdict for a completed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Tool reported a healthy state
    Clean,
    /// Tool found problems it did not fix
    IssuesDetected,
    /// Tool found problems and fixed them during the same run
    IssuesRepaired,
    /// Process failed to start or exited non-zero
    ExecutionFailed,
}

impl Outcome {
    /// Ordering used when reducing many outcomes to one
    pub fn severity(&self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::IssuesRepaired => 1,
            Self::IssuesDetected => 2,
            Self::ExecutionFailed => 3,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Clean => "✓",
            Self::IssuesRepaired => "✚",
            Self::IssuesDetected => "⚠",
            Self::ExecutionFailed => "✗",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::IssuesRepaired => "issues repaired",
            Self::IssuesDetected => "issues detected",
            Self::ExecutionFailed => "execution failed",
        }
    }

    /// Clean and repaired both leave the system healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Clean | Self::IssuesRepaired)
    }
}

/// Outcome plus the message shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    pub outcome: Outcome,
    pub message: String,
}

impl ClassificationOutcome {
    pub fn new(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
        }
    }

    pub fn icon(&self) -> &'static str {
        self.outcome.icon()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Outcome::ExecutionFailed.severity() > Outcome::IssuesDetected.severity());
        assert!(Outcome::IssuesDetected.severity() > Outcome::IssuesRepaired.severity());
        assert!(Outcome::IssuesRepaired.severity() > Outcome::Clean.severity());
    }

    #[test]
    fn test_healthy_outcomes() {
        assert!(Outcome::Clean.is_healthy());
        assert!(Outcome::IssuesRepaired.is_healthy());
        assert!(!Outcome::IssuesDetected.is_healthy());
        assert!(!Outcome::ExecutionFailed.is_healthy());
    }

    #[test]
    fn test_outcome_serde_names() {
        assert_eq!(serde_json::to_string(&Outcome::IssuesDetected).unwrap(), "\"issues-detected\"");
        let parsed: Outcome = serde_json::from_str("\"execution-failed\"").unwrap();
        assert_eq!(parsed, Outcome::ExecutionFailed);
    }

    #[test]
    fn test_classification_icon_follows_outcome() {
        let c = ClassificationOutcome::new(Outcome::Clean, "no corruption");
        assert_eq!(c.icon(), Outcome::Clean.icon());
    }
}
