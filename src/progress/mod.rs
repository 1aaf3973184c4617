//! Progress estimator - a synthetic per-step ramp.
//!
//! The tools report no usable progress, so each step ramps from 0 toward a
//! ceiling below 1.0 at a rate derived from a static duration estimate. The
//! remainder is covered by the explicit completion signal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Callback receiving (overall fraction, status text)
pub type ProgressSink = Arc<dyn Fn(f64, &str) + Send + Sync>;

/// Expected run time per display name, in seconds
pub fn default_durations() -> HashMap<String, u64> {
    [
        ("DISM Check Health", 2),
        ("DISM Scan Health", 55),
        ("DISM Restore Health", 60),
        ("System File Checker", 60),
        ("Check Disk", 30),
        ("Check Disk Fix", 30),
    ]
    .into_iter()
    .map(|(name, secs)| (name.to_string(), secs))
    .collect()
}

#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Ramp cadence
    pub tick_interval: Duration,
    /// The ramp never passes this fraction on its own
    pub ceiling: f64,
    /// Used for display names with no estimate
    pub default_duration: Duration,
    pub durations: HashMap<String, Duration>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            ceiling: 0.95,
            default_duration: Duration::from_secs(30),
            durations: default_durations()
                .into_iter()
                .map(|(name, secs)| (name, Duration::from_secs(secs)))
                .collect(),
        }
    }
}

/// Where the current step sits in the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPosition {
    pub completed: usize,
    pub total: usize,
}

impl StepPosition {
    pub fn overall(&self, fraction: f64) -> f64 {
        overall_progress(self.completed, self.total, fraction)
    }
}

/// (completed + fraction) / total, kept within [0, 1]
pub fn overall_progress(completed: usize, total: usize, fraction: f64) -> f64 {
    let fraction = fraction.clamp(0.0, 1.0);
    if total == 0 {
        return fraction;
    }
    ((completed as f64 + fraction) / total as f64).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Default)]
pub struct ProgressEstimator {
    config: ProgressConfig,
}

impl ProgressEstimator {
    pub fn new(config: ProgressConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    pub fn expected_duration(&self, display_name: &str) -> Duration {
        self.config
            .durations
            .get(display_name)
            .copied()
            .unwrap_or(self.config.default_duration)
    }

    /// Fraction added per tick: 1 / (duration_seconds * ticks_per_second)
    pub fn increment(&self, display_name: &str) -> f64 {
        let duration = self.expected_duration(display_name).as_secs_f64();
        let tick = self.config.tick_interval.as_secs_f64();
        if duration <= 0.0 || tick <= 0.0 {
            return self.config.ceiling;
        }
        tick / duration
    }

    /// Start ramping on a background task. Stops at the ceiling, on `stop()`,
    /// or when `cancel` fires.
    pub fn start(
        &self,
        display_name: &str,
        position: StepPosition,
        sink: ProgressSink,
        cancel: CancellationToken,
    ) -> ProgressTicker {
        let increment = self.increment(display_name);
        let ceiling = self.config.ceiling.clamp(0.0, 1.0);
        let tick = self.config.tick_interval;
        let status = format!("Running {}...", display_name);
        let token = cancel.child_token();
        let ticking = token.clone();

        debug!("Progress ramp for '{}': +{:.4} every {:?}", display_name, increment, tick);

        let task = tokio::spawn(async move {
            let mut fraction: f64 = 0.0;
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            while fraction < ceiling {
                tokio::select! {
                    biased;
                    _ = ticking.cancelled() => break,
                    _ = interval.tick() => {}
                }
                fraction = (fraction + increment).min(ceiling);
                sink(position.overall(fraction), &status);
            }
            fraction
        });

        ProgressTicker {
            cancel: token,
            task: Some(task),
        }
    }
}

/// Handle on a running ramp; dropping it stops the ramp.
pub struct ProgressTicker {
    cancel: CancellationToken,
    task: Option<JoinHandle<f64>>,
}

impl ProgressTicker {
    /// Stop immediately and return the fraction reached
    pub async fn stop(mut self) -> f64 {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => task.await.unwrap_or(0.0),
            None => 0.0,
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn fast_config(step_ms: u64) -> ProgressConfig {
        let mut durations = HashMap::new();
        durations.insert("Quick".to_string(), Duration::from_millis(step_ms));
        ProgressConfig {
            tick_interval: Duration::from_millis(10),
            ceiling: 0.95,
            default_duration: Duration::from_secs(30),
            durations,
        }
    }

    fn recording_sink() -> (ProgressSink, Arc<Mutex<Vec<(f64, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink: ProgressSink = Arc::new(move |f: f64, s: &str| {
            captured.lock().unwrap().push((f, s.to_string()))
        });
        (sink, seen)
    }

    #[test]
    fn test_increment_from_duration() {
        let estimator = ProgressEstimator::default();
        // 2s at 10 ticks/s
        assert!((estimator.increment("DISM Check Health") - 0.05).abs() < 1e-9);
        // unknown names use the 30s fallback
        assert!((estimator.increment("Defragment") - 1.0 / 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_expected_duration_fallback() {
        let estimator = ProgressEstimator::default();
        assert_eq!(estimator.expected_duration("System File Checker"), Duration::from_secs(60));
        assert_eq!(estimator.expected_duration("nope"), Duration::from_secs(30));
    }

    #[test]
    fn test_overall_progress() {
        assert_eq!(overall_progress(0, 2, 0.0), 0.0);
        assert_eq!(overall_progress(1, 2, 0.0), 0.5);
        assert_eq!(overall_progress(1, 2, 0.5), 0.75);
        assert_eq!(overall_progress(2, 2, 1.0), 1.0);
        assert_eq!(overall_progress(5, 2, 1.0), 1.0);
        assert_eq!(overall_progress(0, 0, 0.4), 0.4);
    }

    #[tokio::test]
    async fn test_ramp_is_monotonic_and_capped() {
        let estimator = ProgressEstimator::new(fast_config(100));
        let (sink, seen) = recording_sink();
        let ticker = estimator.start(
            "Quick",
            StepPosition { completed: 1, total: 2 },
            sink,
            CancellationToken::new(),
        );
        tokio::time::sleep(Duration::from_millis(400)).await;
        let reached = ticker.stop().await;

        assert!((reached - 0.95).abs() < 1e-9);
        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(seen.iter().all(|(f, _)| *f >= 0.5 && *f <= 0.975 + 1e-9));
        assert_eq!(seen[0].1, "Running Quick...");
    }

    #[tokio::test]
    async fn test_stop_is_immediate() {
        let estimator = ProgressEstimator::new(fast_config(100));
        let (sink, _seen) = recording_sink();
        let ticker = estimator.start(
            "Slow unknown step",
            StepPosition { completed: 0, total: 1 },
            sink,
            CancellationToken::new(),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        let started = std::time::Instant::now();
        let reached = ticker.stop().await;
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(reached < 0.05);
    }

    #[tokio::test]
    async fn test_parent_cancel_stops_ramp() {
        let estimator = ProgressEstimator::new(fast_config(100));
        let (sink, seen) = recording_sink();
        let cancel = CancellationToken::new();
        let position = StepPosition { completed: 0, total: 1 };
        let ticker = estimator.start("Slow unknown step", position, sink, cancel.clone());
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let count = seen.lock().unwrap().len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.lock().unwrap().len(), count);
        ticker.stop().await;
    }
}
