//! Confirmation strategies for follow-up steps.
//!
//! The sequencer blocks on the answer; any `Fn(&str, &str) -> bool` works.

/// Decides whether a proposed follow-up should run
pub trait Confirm: Send + Sync {
    fn confirm(&self, title: &str, message: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn confirm(&self, title: &str, message: &str) -> bool {
        self(title, message)
    }
}

/// Unattended: accept every follow-up
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&self, _title: &str, _message: &str) -> bool {
        true
    }
}

/// Report-only: decline every follow-up
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverConfirm;

impl Confirm for NeverConfirm {
    fn confirm(&self, _title: &str, _message: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_answers() {
        assert!(AlwaysConfirm.confirm("t", "m"));
        assert!(!NeverConfirm.confirm("t", "m"));
    }

    #[test]
    fn test_closure_strategy() {
        let only_disk = |title: &str, _message: &str| title.contains("Disk");
        assert!(only_disk.confirm("Disk Errors Detected", ""));
        assert!(!only_disk.confirm("DISM Corruption Detected", ""));
    }
}
