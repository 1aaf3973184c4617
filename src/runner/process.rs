//! Process runner - launches one external command and captures its output.
//!
//! Spawns the process with both pipes redirected, starts one StreamReader per
//! pipe, and drives the OutputAggregator until the process exits or the run is
//! stopped. A stop sends a graceful terminate, waits `stop_grace`, then kills.

use std::process::ExitStatus;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{CommandSpec, ERROR_PREFIX, ExecutionResult, StreamSource};
use crate::error::HealthError;

use super::aggregator::{LineSink, OutputAggregator, Poll};
use super::handle::RunHandle;
use super::reader::StreamReader;

/// Prefix of the echo line emitted before every invocation
pub const PROMPT: &str = "C:\\> ";

/// Timing knobs for the process runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Bounded wait used while draining the line queue
    pub poll_interval: Duration,
    /// Time between the terminate signal and the force kill
    pub stop_grace: Duration,
    /// How long to wait for the readers after the process is gone
    pub reader_join_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            stop_grace: Duration::from_secs(5),
            reader_join_timeout: Duration::from_secs(1),
        }
    }
}

/// Anything that can turn a CommandSpec into an ExecutionResult.
///
/// Implementations must never run two commands at once and must return
/// promptly once `cancel` fires.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, spec: &CommandSpec, cancel: &CancellationToken) -> ExecutionResult;
}

/// Executor backed by real OS processes
pub struct ProcessRunner {
    config: RunnerConfig,
    sink: Option<LineSink>,
    handle: RunHandle,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            sink: None,
            handle: RunHandle::new(),
        }
    }

    /// Send every captured line (and the command echo) to `sink`
    pub fn with_sink(mut self, sink: LineSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Handle that stops whatever `run` is executing
    pub fn handle(&self) -> RunHandle {
        self.handle.clone()
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Execute under this runner's own handle
    pub async fn run(&self, spec: &CommandSpec) -> ExecutionResult {
        self.execute(spec, self.handle.token()).await
    }

    fn emit(&self, line: &str) {
        if let Some(sink) = &self.sink {
            sink(line);
        }
    }

    fn spawn_readers(
        &self,
        child: &mut Child,
        spec: &CommandSpec,
        tx: mpsc::UnboundedSender<crate::domain::OutputLine>,
        cancel: &CancellationToken,
    ) -> Vec<JoinHandle<usize>> {
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let reader = StreamReader::new(StreamSource::Stdout, spec.encoding());
            readers.push(reader.spawn(stdout, tx.clone(), cancel.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            let reader = StreamReader::new(StreamSource::Stderr, spec.encoding());
            readers.push(reader.spawn(stderr, tx, cancel.clone()));
        }
        readers
    }

    /// Wait for the readers to hit end of stream. A grandchild that inherited a
    /// pipe can keep it open forever, so past the timeout the readers are told to stop.
    async fn join_readers(&self, readers: Vec<JoinHandle<usize>>, cancel: &CancellationToken) {
        for mut reader in readers {
            match tokio::time::timeout(self.config.reader_join_timeout, &mut reader).await {
                Ok(Ok(lines)) => debug!("Reader finished after {} lines", lines),
                Ok(Err(e)) => warn!("Reader task failed: {}", e),
                Err(_) => {
                    debug!(
                        "Reader still open after {:?}, stopping it",
                        self.config.reader_join_timeout
                    );
                    cancel.cancel();
                    if let Err(e) = reader.await {
                        warn!("Reader task failed: {}", e);
                    }
                }
            }
        }
    }

    /// Graceful terminate, bounded wait, then force kill.
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) -> Option<ExitStatus> {
        send_terminate(child, pid);
        let status = match tokio::time::timeout(self.config.stop_grace, child.wait()).await {
            Ok(status) => status.ok(),
            Err(_) => {
                warn!("Process did not exit within {:?}, killing it", self.config.stop_grace);
                send_kill(child, pid);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill process: {}", e);
                }
                child.wait().await.ok()
            }
        };
        // Sweep anything the shell left behind in its group
        send_kill(child, pid);
        status
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

#[async_trait]
impl CommandExecutor for ProcessRunner {
    async fn execute(&self, spec: &CommandSpec, cancel: &CancellationToken) -> ExecutionResult {
        let started = Instant::now();
        self.emit(&format!("{}{}", PROMPT, spec.command()));

        let spawned = spec
            .to_command()
            .and_then(|mut cmd| cmd.spawn().map_err(|e| HealthError::Spawn(e.to_string())));
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let message = e.to_string();
                warn!("Could not start '{}': {}", spec.command(), message);
                self.emit(&format!("{}{}", ERROR_PREFIX, message));
                return ExecutionResult::spawn_failure(spec.command(), message)
                    .with_duration(started.elapsed());
            }
        };
        let pid = child.id();
        info!("Started '{}' (pid {:?})", spec.command(), pid);

        let (tx, rx) = mpsc::unbounded_channel();
        let readers_cancel = cancel.child_token();
        let readers = self.spawn_readers(&mut child, spec, tx, &readers_cancel);
        let mut aggregator =
            OutputAggregator::new(rx, self.sink.clone(), self.config.poll_interval);

        let mut queue_open = true;
        let mut cancelled = false;
        let status = loop {
            tokio::select! {
                status = child.wait() => break status.ok(),
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break self.terminate(&mut child, pid).await;
                }
                poll = aggregator.poll(), if queue_open => {
                    if poll == Poll::Closed {
                        queue_open = false;
                    }
                }
            }
        };

        self.join_readers(readers, &readers_cancel).await;
        let late = aggregator.drain();
        if late > 0 {
            debug!("Drained {} late lines", late);
        }

        let exit_code = status.and_then(|s| s.code()).unwrap_or(-1);
        let lines = aggregator.line_count();
        let (output, error) = aggregator.finish();
        let result = ExecutionResult::new(spec.command(), exit_code, output, error)
            .with_duration(started.elapsed());

        info!(
            "'{}' finished: exit code {}, {} lines, {:?}{}",
            spec.command(),
            exit_code,
            lines,
            result.duration,
            if cancelled { " (stopped)" } else { "" }
        );

        if cancelled { result.mark_cancelled() } else { result }
    }
}

// `pid` is captured at spawn: tokio forgets it once the child is reaped.
#[cfg(unix)]
fn send_terminate(_child: &mut Child, pid: Option<u32>) {
    signal_group(pid, nix::sys::signal::Signal::SIGTERM);
}

#[cfg(unix)]
fn send_kill(_child: &mut Child, pid: Option<u32>) {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
}

/// The child leads its own process group (see CommandSpec::to_command)
#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    use nix::sys::signal;
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        let pgid = Pid::from_raw(-(pid as i32));
        if let Err(e) = signal::kill(pgid, signal) {
            debug!("{:?} to process group {} failed: {}", signal, pid, e);
        }
    }
}

// Console tools get no graceful signal on Windows; terminate is the kill.
#[cfg(not(unix))]
fn send_terminate(child: &mut Child, _pid: Option<u32>) {
    if let Err(e) = child.start_kill() {
        debug!("Terminate failed: {}", e);
    }
}

#[cfg(not(unix))]
fn send_kill(child: &mut Child, _pid: Option<u32>) {
    let _ = child.start_kill();
}
