//! Step reports and the end-of-run reduction.

use serde::Serialize;

use crate::domain::{ClassificationOutcome, ExecutionResult, Outcome};

/// One finished step, as handed to the caller
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step_id: String,
    pub display_name: String,
    pub result: ExecutionResult,
    pub classification: ClassificationOutcome,
    /// Index (into the run's reports) of the step that triggered this one
    pub follow_up_of: Option<usize>,
}

impl StepReport {
    pub fn outcome(&self) -> Outcome {
        self.classification.outcome
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub reports: Vec<StepReport>,
    /// Requested ids that are not in the catalog
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

impl RunSummary {
    /// Outcome after accounting for follow-ups: a step whose issues were
    /// handed to a follow-up that ended healthy counts as repaired.
    pub fn effective_outcome(&self, index: usize) -> Option<Outcome> {
        let report = self.reports.get(index)?;
        let outcome = report.outcome();
        if outcome != Outcome::IssuesDetected {
            return Some(outcome);
        }

        let resolved = self
            .reports
            .iter()
            .enumerate()
            .filter(|(_, r)| r.follow_up_of == Some(index))
            .any(|(i, _)| self.effective_outcome(i).is_some_and(|o| o.is_healthy()));

        Some(if resolved { Outcome::IssuesRepaired } else { outcome })
    }

    /// Most severe effective outcome; Clean for an empty run
    pub fn overall(&self) -> Outcome {
        (0..self.reports.len())
            .filter_map(|i| self.effective_outcome(i))
            .max_by_key(|o| o.severity())
            .unwrap_or(Outcome::Clean)
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.reports.iter().filter(|r| r.outcome() == outcome).count()
    }

    /// Human-readable summary block
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            "EXECUTION SUMMARY".to_string(),
            format!("Total diagnostics ran: {}", self.reports.len()),
        ];
        for (i, report) in self.reports.iter().enumerate() {
            let outcome = self.effective_outcome(i).unwrap_or(report.outcome());
            lines.push(format!(
                "{} {}: {} ({})",
                outcome.icon(),
                report.display_name,
                report.classification.message,
                outcome.label()
            ));
        }
        for id in &self.skipped {
            lines.push(format!("- {}: skipped (unknown tool)", id));
        }
        if self.cancelled {
            lines.push("Run stopped before all diagnostics finished.".to_string());
        }
        let overall = self.overall();
        lines.push(format!("Overall: {} {}", overall.icon(), overall.label()));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: &str, outcome: Outcome, follow_up_of: Option<usize>) -> StepReport {
        let exit_code = if outcome == Outcome::ExecutionFailed { 1 } else { 0 };
        StepReport {
            step_id: id.to_string(),
            display_name: id.to_string(),
            result: ExecutionResult::new(id, exit_code, "", ""),
            classification: ClassificationOutcome::new(outcome, "msg"),
            follow_up_of,
        }
    }

    #[test]
    fn test_empty_run_is_clean() {
        assert_eq!(RunSummary::default().overall(), Outcome::Clean);
    }

    #[test]
    fn test_most_severe_wins() {
        let summary = RunSummary {
            reports: vec![
                report("a", Outcome::Clean, None),
                report("b", Outcome::ExecutionFailed, None),
                report("c", Outcome::IssuesDetected, None),
            ],
            ..Default::default()
        };
        assert_eq!(summary.overall(), Outcome::ExecutionFailed);
    }

    #[test]
    fn test_repaired_follow_up_resolves_check() {
        let summary = RunSummary {
            reports: vec![
                report("chkdsk_check", Outcome::IssuesDetected, None),
                report("chkdsk_fix", Outcome::Clean, Some(0)),
            ],
            ..Default::default()
        };
        assert_eq!(summary.effective_outcome(0), Some(Outcome::IssuesRepaired));
        assert_eq!(summary.overall(), Outcome::IssuesRepaired);
    }

    #[test]
    fn test_chain_resolution_is_transitive() {
        let summary = RunSummary {
            reports: vec![
                report("dism_check", Outcome::IssuesDetected, None),
                report("dism_scan", Outcome::IssuesDetected, Some(0)),
                report("dism_restore", Outcome::Clean, Some(1)),
            ],
            ..Default::default()
        };
        assert_eq!(summary.overall(), Outcome::IssuesRepaired);
    }

    #[test]
    fn test_failed_follow_up_leaves_issues() {
        let summary = RunSummary {
            reports: vec![
                report("dism_scan", Outcome::IssuesDetected, None),
                report("dism_restore", Outcome::ExecutionFailed, Some(0)),
            ],
            ..Default::default()
        };
        assert_eq!(summary.effective_outcome(0), Some(Outcome::IssuesDetected));
        assert_eq!(summary.overall(), Outcome::ExecutionFailed);
    }

    #[test]
    fn test_lines_mention_skipped_and_cancel() {
        let summary = RunSummary {
            reports: vec![report("sfc_scan", Outcome::Clean, None)],
            skipped: vec!["defrag".to_string()],
            cancelled: true,
        };
        let lines = summary.lines();
        assert_eq!(lines[0], "EXECUTION SUMMARY");
        assert!(lines.iter().any(|l| l.contains("defrag")));
        assert!(lines.iter().any(|l| l.contains("stopped")));
        assert_eq!(summary.count(Outcome::Clean), 1);
    }
}
