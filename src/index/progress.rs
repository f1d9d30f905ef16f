//! Progress reporting and cooperative cancellation

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Observer notified while an index is rebuilt.
///
/// The rebuild driver reports one unit per row read and polls
/// [`is_active`](Progress::is_active) after each row; returning `false`
/// stops the rebuild.
pub trait Progress: Send + Sync {
    /// Total number of units expected
    fn set_max(&self, max: u64);

    fn add_progress(&self, progress: u64);

    fn is_active(&self) -> bool;
}

/// Thread-safe [`Progress`] that counts units and can be cancelled.
///
/// # Examples
///
/// ```rust
/// use gpkg_index::{Progress, ProgressCounter};
///
/// let progress = ProgressCounter::new().cancel_after(2);
/// progress.set_max(10);
/// progress.add_progress(1);
/// assert!(progress.is_active());
/// progress.add_progress(1);
/// assert!(!progress.is_active());
/// ```
#[derive(Debug)]
pub struct ProgressCounter {
    max: AtomicU64,
    progress: AtomicU64,
    active: AtomicBool,
    limit: Option<u64>,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self {
            max: AtomicU64::new(0),
            progress: AtomicU64::new(0),
            active: AtomicBool::new(true),
            limit: None,
        }
    }

    /// Become inactive once `units` have been reported.
    pub fn cancel_after(mut self, units: u64) -> Self {
        self.limit = Some(units);
        self
    }

    /// Stop the observed operation at its next poll.
    pub fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::SeqCst)
    }
}

impl Default for ProgressCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for ProgressCounter {
    fn set_max(&self, max: u64) {
        self.max.store(max, Ordering::SeqCst);
    }

    fn add_progress(&self, progress: u64) {
        self.progress.fetch_add(progress, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        match self.limit {
            Some(limit) => self.progress() < limit,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_units() {
        let progress = ProgressCounter::new();
        progress.set_max(5);
        progress.add_progress(2);
        progress.add_progress(1);
        assert_eq!(progress.max(), 5);
        assert_eq!(progress.progress(), 3);
        assert!(progress.is_active());
    }

    #[test]
    fn test_cancel() {
        let progress = ProgressCounter::new();
        progress.cancel();
        assert!(!progress.is_active());
    }
}
