//! Outcome classifier - maps a completed run to a four-way verdict.
//!
//! The diagnostic tools have no structured output mode, so each tool gets a
//! flat table of lower-case signature phrases matched against its output.
//! A tool rewording its output silently changes the verdict; there is no
//! structured alternative to fall back on.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::domain::{ClassificationOutcome, ExecutionResult, Outcome};

/// How a tool's successful output maps to an outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignatureRule {
    /// Clean when any phrase appears, `otherwise` when none does
    CleanPhrases { phrases: Vec<String>, otherwise: Outcome },
    /// Every successful exit is clean
    AlwaysClean,
}

impl SignatureRule {
    pub fn clean_phrases<I, S>(phrases: I, otherwise: Outcome) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::CleanPhrases {
            phrases: phrases.into_iter().map(|p| p.into().to_lowercase()).collect(),
            otherwise,
        }
    }

    /// Outcome for a successful run whose lower-cased output is `normalized`
    pub fn evaluate(&self, normalized: &str) -> Outcome {
        match self {
            Self::CleanPhrases { phrases, otherwise } => {
                if phrases.iter().any(|p| normalized.contains(p.as_str())) {
                    Outcome::Clean
                } else {
                    *otherwise
                }
            }
            Self::AlwaysClean => Outcome::Clean,
        }
    }
}

/// Tool name → signature rule table
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: HashMap<String, SignatureRule>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, tool: impl Into<String>, rule: SignatureRule) -> Self {
        self.rules.insert(tool.into(), rule);
        self
    }

    /// One rule per catalog step, keyed by step id
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let rules = catalog
            .steps()
            .iter()
            .map(|step| (step.id.clone(), step.rule.clone()))
            .collect();
        Self { rules }
    }

    pub fn rule(&self, tool: &str) -> Option<&SignatureRule> {
        self.rules.get(tool)
    }

    /// Pure function of tool name and result.
    ///
    /// A failed run is always ExecutionFailed. A tool with no rule is Clean.
    pub fn classify(&self, tool: &str, result: &ExecutionResult) -> ClassificationOutcome {
        if !result.succeeded {
            let message = if result.cancelled {
                "Stopped before completion".to_string()
            } else {
                format!("Failed with exit code {}", result.exit_code)
            };
            return ClassificationOutcome::new(Outcome::ExecutionFailed, message);
        }

        let Some(rule) = self.rules.get(tool) else {
            debug!("No signature rule for '{}', treating as clean", tool);
            return ClassificationOutcome::new(Outcome::Clean, "Completed (no signature to check)");
        };

        let outcome = rule.evaluate(&result.normalized_output());
        let message = match (rule, outcome) {
            (SignatureRule::AlwaysClean, _) => "Completed successfully",
            (_, Outcome::Clean) => "No issues found",
            (_, Outcome::IssuesDetected) => "Issues detected",
            (_, Outcome::IssuesRepaired) => "Issues found and repaired",
            (_, Outcome::ExecutionFailed) => "Failed",
        };
        ClassificationOutcome::new(outcome, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(output: &str) -> ExecutionResult {
        ExecutionResult::new("tool", 0, output, "")
    }

    fn builtin() -> Classifier {
        Classifier::from_catalog(&Catalog::builtin("c:"))
    }

    #[test]
    fn test_dism_scan_clean_phrase() {
        let c = builtin().classify(
            "dism_scan",
            &ok("No component store corruption detected.\nThe operation completed successfully."),
        );
        assert_eq!(c.outcome, Outcome::Clean);
    }

    #[test]
    fn test_dism_scan_without_phrase_is_issues_detected() {
        let c = builtin().classify("dism_scan", &ok("The component store is repairable."));
        assert_eq!(c.outcome, Outcome::IssuesDetected);
    }

    #[test]
    fn test_dism_check_matches_case_insensitively() {
        let c = builtin().classify("dism_check", &ok("NO COMPONENT STORE CORRUPTION DETECTED"));
        assert_eq!(c.outcome, Outcome::Clean);
    }

    #[test]
    fn test_dism_restore_any_success_is_clean() {
        let c = builtin().classify(
            "dism_restore",
            &ok("The restore operation completed successfully."),
        );
        assert_eq!(c.outcome, Outcome::Clean);
        let c = builtin().classify("dism_restore", &ok(""));
        assert_eq!(c.outcome, Outcome::Clean);
    }

    #[test]
    fn test_sfc_clean_and_self_repaired() {
        let clean = builtin().classify(
            "sfc_scan",
            &ok("Windows Resource Protection did not find any integrity violations."),
        );
        assert_eq!(clean.outcome, Outcome::Clean);

        let repaired = builtin().classify(
            "sfc_scan",
            &ok("Windows Resource Protection found corrupt files and successfully repaired them."),
        );
        assert_eq!(repaired.outcome, Outcome::IssuesRepaired);
    }

    #[test]
    fn test_chkdsk_check_phrases() {
        let clean = builtin().classify(
            "chkdsk_check",
            &ok("Windows has scanned the file system and found no problems.\n\
                 No further action is required."),
        );
        assert_eq!(clean.outcome, Outcome::Clean);

        let dirty = builtin().classify(
            "chkdsk_check",
            &ok("Errors found. CHKDSK cannot continue in read-only mode."),
        );
        assert_eq!(dirty.outcome, Outcome::IssuesDetected);
    }

    #[test]
    fn test_chkdsk_fix_any_success_is_clean() {
        let c = builtin().classify(
            "chkdsk_fix",
            &ok("Chkdsk cannot run because the volume is in use"),
        );
        assert_eq!(c.outcome, Outcome::Clean);
    }

    #[test]
    fn test_nonzero_exit_is_failed_regardless_of_output() {
        let result = ExecutionResult::new("dism", 2, "No component store corruption detected.", "");
        let c = builtin().classify("dism_scan", &result);
        assert_eq!(c.outcome, Outcome::ExecutionFailed);
        assert!(c.message.contains("exit code 2"));
    }

    #[test]
    fn test_cancelled_message() {
        let result = ExecutionResult::new("sfc", -1, "", "").mark_cancelled();
        let c = builtin().classify("sfc_scan", &result);
        assert_eq!(c.outcome, Outcome::ExecutionFailed);
        assert_eq!(c.message, "Stopped before completion");
    }

    #[test]
    fn test_unknown_tool_fails_open() {
        let c = builtin().classify("defrag", &ok("anything at all"));
        assert_eq!(c.outcome, Outcome::Clean);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let classifier = builtin();
        let result = ok("The component store is repairable.");
        assert_eq!(
            classifier.classify("dism_scan", &result),
            classifier.classify("dism_scan", &result)
        );
    }

    #[test]
    fn test_phrases_are_lowercased_on_construction() {
        let rule = SignatureRule::clean_phrases(["All Good"], Outcome::IssuesDetected);
        assert_eq!(rule.evaluate("status: all good"), Outcome::Clean);
    }

    #[test]
    fn test_custom_rule_table() {
        let classifier = Classifier::new().with_rule("defrag", SignatureRule::AlwaysClean);
        assert!(classifier.rule("defrag").is_some());
        assert!(classifier.rule("dism_scan").is_none());
    }
}
