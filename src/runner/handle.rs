//! Run handle - the caller's side of cancellation.

use tokio_util::sync::CancellationToken;

/// Owned by whoever started a run; `stop()` reaches every worker of it.
#[derive(Debug, Clone, Default)]
pub struct RunHandle {
    token: CancellationToken,
}

impl RunHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            log::info!("Stop requested");
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Token for a sub-worker; cancelled with this handle, never the other way round
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_idempotent() {
        let handle = RunHandle::new();
        assert!(!handle.is_stopped());
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
    }

    #[test]
    fn test_stop_reaches_clones_and_children() {
        let handle = RunHandle::new();
        let clone = handle.clone();
        let child = handle.child_token();
        clone.stop();
        assert!(handle.is_stopped());
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_cancel_does_not_stop_parent() {
        let handle = RunHandle::new();
        let child = handle.child_token();
        child.cancel();
        assert!(!handle.is_stopped());
    }
}
