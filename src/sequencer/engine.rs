//! Diagnostic sequencer - walks a RunPlan one step at a time.
//!
//! For each step: banner, progress ramp, execute, classify, report. When a
//! step's outcome fires its follow-up trigger the confirmation strategy is
//! asked, and on a yes the follow-up is inserted directly after the current
//! step so it runs next.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::catalog::{Catalog, DiagnosticStep, FollowUp};
use crate::classify::Classifier;
use crate::domain::ERROR_PREFIX;
use crate::error::{HealthError, Result};
use crate::progress::{ProgressEstimator, ProgressSink, ProgressTicker, StepPosition};
use crate::runner::{CommandExecutor, LineSink, ProcessRunner, RunHandle, RunnerConfig};

use super::confirm::Confirm;
use super::plan::RunPlan;
use super::summary::{RunSummary, StepReport};

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Pause between two steps
    pub inter_step_delay: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            inter_step_delay: Duration::from_millis(500),
        }
    }
}

pub struct Sequencer {
    catalog: Catalog,
    classifier: Classifier,
    executor: Option<Arc<dyn CommandExecutor>>,
    runner_config: RunnerConfig,
    estimator: ProgressEstimator,
    confirm: Option<Arc<dyn Confirm>>,
    sink: Option<LineSink>,
    progress: Option<ProgressSink>,
    config: SequencerConfig,
}

impl Sequencer {
    /// Sequencer over `catalog`, classifying with the catalog's own rules
    pub fn new(catalog: Catalog) -> Self {
        let classifier = Classifier::from_catalog(&catalog);
        Self {
            catalog,
            classifier,
            executor: None,
            runner_config: RunnerConfig::default(),
            estimator: ProgressEstimator::default(),
            confirm: None,
            sink: None,
            progress: None,
            config: SequencerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SequencerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the process-backed executor
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Timing for the default process-backed executor
    pub fn with_runner_config(mut self, config: RunnerConfig) -> Self {
        self.runner_config = config;
        self
    }

    pub fn with_estimator(mut self, estimator: ProgressEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Without a strategy every follow-up proceeds
    pub fn with_confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = Some(confirm);
        self
    }

    pub fn with_sink(mut self, sink: LineSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Run `ids` to completion on the current task
    pub async fn run<I, S>(&self, ids: I, handle: &RunHandle) -> RunSummary
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drive(RunPlan::new(ids), handle, None).await
    }

    /// Move the whole run onto a background task
    pub fn spawn<I, S>(self, ids: I) -> RunSession
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let plan = RunPlan::new(ids);
        let handle = RunHandle::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = handle.clone();
        let task = tokio::spawn(async move { self.drive(plan, &worker, Some(tx)).await });
        RunSession {
            handle,
            reports: rx,
            task,
        }
    }

    async fn drive(
        &self,
        mut plan: RunPlan,
        handle: &RunHandle,
        reports_tx: Option<mpsc::UnboundedSender<StepReport>>,
    ) -> RunSummary {
        let executor = self.executor();
        let mut summary = RunSummary::default();
        // plan index -> report index, so follow-ups can point at their parent's report
        let mut report_of: HashMap<usize, usize> = HashMap::new();

        info!("Starting run of {} step(s)", plan.initial_len());

        while let Some((index, planned)) = plan.next_step() {
            if handle.is_stopped() {
                summary.cancelled = true;
                break;
            }

            let Some(step) = self.catalog.get(&planned.id) else {
                warn!("Skipping unknown tool '{}'", planned.id);
                let error = HealthError::UnknownStep(planned.id.clone());
                self.emit(&format!("{}{}", ERROR_PREFIX, error));
                summary.skipped.push(planned.id);
                continue;
            };

            // a confirmed follow-up starts straight after its check
            if index > 0 && planned.parent.is_none() && !self.pause(handle).await {
                summary.cancelled = true;
                break;
            }

            match planned.parent {
                Some(_) => self.emit(&format!("--- Proceeding to {} ---", step.display_name)),
                None => self.banner(step),
            }

            let position = StepPosition {
                completed: index,
                total: plan.progress_total(index),
            };
            let ticker = self.start_ticker(step, position, handle);
            let result = executor.execute(&step.command, handle.token()).await;
            if let Some(ticker) = ticker {
                ticker.stop().await;
            }

            let classification = self.classifier.classify(&step.id, &result);
            if !result.succeeded {
                self.emit(&format!(
                    "{}{} failed with exit code {}",
                    ERROR_PREFIX, step.id, result.exit_code
                ));
                if !result.error.is_empty() {
                    self.emit(&format!("Error details: {}", result.error));
                }
            }
            self.emit(&format!("--- {} COMPLETED ---", step.banner_name()));
            info!("{} -> {} ({})", step.id, classification.outcome.label(), classification.message);

            let stopped = result.cancelled || handle.is_stopped();
            let outcome = classification.outcome;
            let report = StepReport {
                step_id: step.id.clone(),
                display_name: step.display_name.clone(),
                result,
                classification,
                follow_up_of: planned.parent.and_then(|p| report_of.get(&p).copied()),
            };
            report_of.insert(index, summary.reports.len());
            if let Some(tx) = &reports_tx {
                if tx.send(report.clone()).is_err() {
                    debug!("Report receiver dropped");
                }
            }
            summary.reports.push(report);

            if stopped {
                summary.cancelled = true;
                break;
            }

            if let Some(follow_up) = step.follow_up.as_ref().filter(|f| f.trigger.fires(outcome)) {
                let accepted = self.ask(follow_up).await;
                if handle.is_stopped() {
                    summary.cancelled = true;
                    break;
                }
                if accepted {
                    info!("Inserting follow-up '{}' after '{}'", follow_up.step, step.id);
                    plan.insert_next(follow_up.step.clone(), index);
                } else {
                    info!("Follow-up '{}' declined", follow_up.step);
                }
            }
        }

        if !summary.cancelled {
            self.report_progress(1.0, "All tools completed");
        }

        self.emit(&"=".repeat(RULE_WIDTH));
        for line in summary.lines() {
            self.emit(&line);
        }
        info!(
            "Run finished: {} step(s), {} skipped, overall {}{}",
            summary.reports.len(),
            summary.skipped.len(),
            summary.overall().label(),
            if summary.cancelled { " (stopped)" } else { "" }
        );
        summary
    }

    fn executor(&self) -> Arc<dyn CommandExecutor> {
        match &self.executor {
            Some(executor) => executor.clone(),
            None => {
                let runner = ProcessRunner::new(self.runner_config.clone());
                match &self.sink {
                    Some(sink) => Arc::new(runner.with_sink(sink.clone())),
                    None => Arc::new(runner),
                }
            }
        }
    }

    /// Inter-step delay; false when the run was stopped during it
    async fn pause(&self, handle: &RunHandle) -> bool {
        if self.config.inter_step_delay.is_zero() {
            return !handle.is_stopped();
        }
        tokio::select! {
            biased;
            _ = handle.token().cancelled() => false,
            _ = tokio::time::sleep(self.config.inter_step_delay) => true,
        }
    }

    /// Blocks the pipeline until the strategy answers
    async fn ask(&self, follow_up: &FollowUp) -> bool {
        let Some(confirm) = self.confirm.clone() else {
            return true;
        };
        let title = follow_up.title.clone();
        let message = follow_up.message.clone();
        match tokio::task::spawn_blocking(move || confirm.confirm(&title, &message)).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Confirmation failed, declining: {}", e);
                false
            }
        }
    }

    fn start_ticker(
        &self,
        step: &DiagnosticStep,
        position: StepPosition,
        handle: &RunHandle,
    ) -> Option<ProgressTicker> {
        let sink = self.progress.clone()?;
        sink(position.overall(0.0), &format!("Running {}...", step.display_name));
        Some(self.estimator.start(&step.display_name, position, sink, handle.child_token()))
    }

    fn banner(&self, step: &DiagnosticStep) {
        let rule = "=".repeat(RULE_WIDTH);
        self.emit(&rule);
        self.emit(&format!("=== {} ===", step.banner_name()));
        self.emit(&rule);
    }

    fn emit(&self, line: &str) {
        if let Some(sink) = &self.sink {
            sink(line);
        }
    }

    fn report_progress(&self, fraction: f64, status: &str) {
        if let Some(progress) = &self.progress {
            progress(fraction, status);
        }
    }
}

/// A run executing on a background task
pub struct RunSession {
    handle: RunHandle,
    reports: mpsc::UnboundedReceiver<StepReport>,
    task: JoinHandle<RunSummary>,
}

impl RunSession {
    pub fn handle(&self) -> RunHandle {
        self.handle.clone()
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Next finished step, or None once the run is over
    pub async fn next_report(&mut self) -> Option<StepReport> {
        self.reports.recv().await
    }

    /// Wait for the worker and return the summary
    pub async fn wait(self) -> Result<RunSummary> {
        self.task.await.map_err(|e| HealthError::Worker(e.to_string()))
    }
}
