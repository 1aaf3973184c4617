//! Output aggregator - merges both readers' lines into one ordered feed.
//!
//! Every line goes to the caller's sink as soon as it arrives and is kept for
//! the final ExecutionResult.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;

use crate::domain::OutputLine;

/// Callback receiving every captured line, synchronously
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Result of one bounded wait on the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// A line was delivered
    Line,
    /// Nothing arrived within the poll interval
    Idle,
    /// Both readers have finished and the queue is empty
    Closed,
}

pub struct OutputAggregator {
    rx: UnboundedReceiver<OutputLine>,
    sink: Option<LineSink>,
    poll_interval: Duration,
    output: Vec<String>,
    errors: Vec<String>,
}

impl OutputAggregator {
    pub fn new(
        rx: UnboundedReceiver<OutputLine>,
        sink: Option<LineSink>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            rx,
            sink,
            poll_interval,
            output: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Wait up to the poll interval for the next line.
    ///
    /// Cancel safe: a line is only taken from the queue when it is also delivered.
    pub async fn poll(&mut self) -> Poll {
        match tokio::time::timeout(self.poll_interval, self.rx.recv()).await {
            Ok(Some(line)) => {
                self.accept(line);
                Poll::Line
            }
            Ok(None) => Poll::Closed,
            Err(_) => Poll::Idle,
        }
    }

    /// Take whatever is already queued without waiting. Returns the number of lines taken.
    pub fn drain(&mut self) -> usize {
        let mut taken = 0;
        loop {
            match self.rx.try_recv() {
                Ok(line) => {
                    self.accept(line);
                    taken += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        taken
    }

    pub fn line_count(&self) -> usize {
        self.output.len()
    }

    /// Newline-joined (output, error) text
    pub fn finish(self) -> (String, String) {
        (self.output.join("\n"), self.errors.join("\n"))
    }

    fn accept(&mut self, line: OutputLine) {
        let shown = line.display();
        if let Some(sink) = &self.sink {
            sink(&shown);
        }
        if line.is_error() {
            self.errors.push(shown.clone());
        }
        self.output.push(shown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn recording_sink() -> (LineSink, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink: LineSink =
            Arc::new(move |line: &str| captured.lock().unwrap().push(line.to_string()));
        (sink, seen)
    }

    #[tokio::test]
    async fn test_poll_delivers_to_sink_and_accumulates() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (sink, seen) = recording_sink();
        let mut aggregator = OutputAggregator::new(rx, Some(sink), Duration::from_millis(100));

        tx.send(OutputLine::stdout("Checking file system")).unwrap();
        tx.send(OutputLine::stderr("Access is denied.")).unwrap();

        assert_eq!(aggregator.poll().await, Poll::Line);
        assert_eq!(aggregator.poll().await, Poll::Line);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["Checking file system".to_string(), "ERROR: Access is denied.".to_string()]
        );

        let (output, error) = aggregator.finish();
        assert_eq!(output, "Checking file system\nERROR: Access is denied.");
        assert_eq!(error, "ERROR: Access is denied.");
    }

    #[tokio::test]
    async fn test_poll_idle_then_closed() {
        let (tx, rx) = mpsc::unbounded_channel::<OutputLine>();
        let mut aggregator = OutputAggregator::new(rx, None, Duration::from_millis(10));
        assert_eq!(aggregator.poll().await, Poll::Idle);
        drop(tx);
        assert_eq!(aggregator.poll().await, Poll::Closed);
    }

    #[tokio::test]
    async fn test_drain_takes_everything_queued() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut aggregator = OutputAggregator::new(rx, None, Duration::from_millis(10));
        for i in 0..5 {
            tx.send(OutputLine::stdout(format!("line {}", i))).unwrap();
        }
        assert_eq!(aggregator.drain(), 5);
        assert_eq!(aggregator.drain(), 0);
        assert_eq!(aggregator.line_count(), 5);
    }

    #[test]
    fn test_finish_empty() {
        let (_tx, rx) = mpsc::unbounded_channel::<OutputLine>();
        let aggregator = OutputAggregator::new(rx, None, Duration::from_millis(10));
        assert_eq!(aggregator.finish(), (String::new(), String::new()));
    }
}
