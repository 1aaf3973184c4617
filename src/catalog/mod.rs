//! Diagnostic catalog - the static step definitions.
//!
//! Each step pairs a check command with its signature rule and, optionally,
//! the follow-up step it may chain into. Chains stay inside one tool family:
//! dism_check → dism_scan → dism_restore, and chkdsk_check → chkdsk_fix.

use serde::{Deserialize, Serialize};

use crate::classify::SignatureRule;
use crate::domain::{CommandSpec, Outcome};
use crate::error::{HealthError, Result};

/// Phrase DISM prints when the component store is healthy
pub const DISM_CLEAN: &str = "no component store corruption detected";
/// Phrases SFC prints when nothing needed repair
pub const SFC_CLEAN: [&str; 2] = [
    "did not find any integrity violations",
    "no integrity violations found",
];
/// Phrases CHKDSK prints when a read-only scan is clean
pub const CHKDSK_CLEAN: [&str; 2] = ["found no problems", "no problems found"];

/// Which outcomes of a step trigger its follow-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Only IssuesDetected
    IssuesDetected,
    /// Anything other than Clean
    NotClean,
}

impl Trigger {
    pub fn fires(&self, outcome: Outcome) -> bool {
        match self {
            Self::IssuesDetected => outcome == Outcome::IssuesDetected,
            Self::NotClean => outcome != Outcome::Clean,
        }
    }
}

/// A repair (or deeper scan) offered after a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    /// Catalog id of the step to insert
    pub step: String,
    pub trigger: Trigger,
    /// Confirmation dialog title
    pub title: String,
    /// Confirmation dialog body
    pub message: String,
}

/// Static definition of one diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticStep {
    pub id: String,
    pub display_name: String,
    pub command: CommandSpec,
    pub rule: SignatureRule,
    pub follow_up: Option<FollowUp>,
}

impl DiagnosticStep {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        command: CommandSpec,
        rule: SignatureRule,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            command,
            rule,
            follow_up: None,
        }
    }

    pub fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = Some(follow_up);
        self
    }

    /// Upper-case section title used in banners
    pub fn banner_name(&self) -> String {
        self.display_name.to_uppercase()
    }
}

/// Ordered set of known steps
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    steps: Vec<DiagnosticStep>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The Windows maintenance tools, with the disk checks aimed at `drive`
    pub fn builtin(drive: &str) -> Self {
        let dism =
            |verb: &str| CommandSpec::shell(format!("DISM /Online /Cleanup-Image /{}", verb));

        Self::new()
            .with_step(
                DiagnosticStep::new(
                    "dism_check",
                    "DISM Check Health",
                    dism("CheckHealth"),
                    SignatureRule::clean_phrases([DISM_CLEAN], Outcome::IssuesDetected),
                )
                .with_follow_up(FollowUp {
                    step: "dism_scan".to_string(),
                    trigger: Trigger::NotClean,
                    title: "DISM Health Check Incomplete".to_string(),
                    message: "DISM CheckHealth did not report a healthy component store.\n\n\
                              Would you like to run DISM ScanHealth for a full scan?\n\
                              (This may take several minutes)"
                        .to_string(),
                }),
            )
            .with_step(
                DiagnosticStep::new(
                    "dism_scan",
                    "DISM Scan Health",
                    dism("ScanHealth"),
                    SignatureRule::clean_phrases([DISM_CLEAN], Outcome::IssuesDetected),
                )
                .with_follow_up(FollowUp {
                    step: "dism_restore".to_string(),
                    trigger: Trigger::IssuesDetected,
                    title: "DISM Corruption Detected".to_string(),
                    message: "DISM has detected corruption that can be repaired.\n\n\
                              Would you like to run DISM RestoreHealth to fix the issues?\n\
                              (This may take several minutes)"
                        .to_string(),
                }),
            )
            .with_step(DiagnosticStep::new(
                "dism_restore",
                "DISM Restore Health",
                dism("RestoreHealth"),
                SignatureRule::AlwaysClean,
            ))
            .with_step(DiagnosticStep::new(
                "sfc_scan",
                "System File Checker",
                CommandSpec::shell("sfc /scannow").wide(),
                SignatureRule::clean_phrases(SFC_CLEAN, Outcome::IssuesRepaired),
            ))
            .with_step(
                DiagnosticStep::new(
                    "chkdsk_check",
                    "Check Disk",
                    CommandSpec::shell(format!("chkdsk {}", drive)),
                    SignatureRule::clean_phrases(CHKDSK_CLEAN, Outcome::IssuesDetected),
                )
                .with_follow_up(FollowUp {
                    step: "chkdsk_fix".to_string(),
                    trigger: Trigger::IssuesDetected,
                    title: "Disk Errors Detected".to_string(),
                    message: "Check Disk has detected errors that can be repaired.\n\n\
                              Would you like to run Check Disk with fix to repair the errors?\n\
                              (This may take several minutes and requires a system restart)"
                        .to_string(),
                }),
            )
            .with_step(DiagnosticStep::new(
                "chkdsk_fix",
                "Check Disk Fix",
                CommandSpec::shell(format!("chkdsk {} /f", drive)),
                SignatureRule::AlwaysClean,
            ))
    }

    /// Add a step, replacing any existing step with the same id in place
    pub fn with_step(mut self, step: DiagnosticStep) -> Self {
        match self.steps.iter_mut().find(|s| s.id == step.id) {
            Some(existing) => *existing = step,
            None => self.steps.push(step),
        }
        self
    }

    /// Swap the command of a known step, keeping its rule and follow-up
    pub fn override_command(&mut self, id: &str, command: CommandSpec) -> Result<()> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| HealthError::UnknownStep(id.to_string()))?;
        step.command = command;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&DiagnosticStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn require(&self, id: &str) -> Result<&DiagnosticStep> {
        self.get(id).ok_or_else(|| HealthError::UnknownStep(id.to_string()))
    }

    pub fn steps(&self) -> &[DiagnosticStep] {
        &self.steps
    }

    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }
}
