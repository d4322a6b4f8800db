//! Global atomic counters for dockyard observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters without allocation or locking.
pub struct Metrics {
    builds_invoked: AtomicU64,
    builds_coalesced: AtomicU64,
    pushes_completed: AtomicU64,
    pushes_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            builds_invoked: AtomicU64::new(0),
            builds_coalesced: AtomicU64::new(0),
            pushes_completed: AtomicU64::new(0),
            pushes_failed: AtomicU64::new(0),
        }
    }

    /// Count one invocation of the build primitive.
    pub fn inc_builds_invoked(&self) {
        self.builds_invoked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "builds_invoked", "counter incremented");
    }

    /// Count one build request answered by an in-flight or finished build.
    pub fn inc_builds_coalesced(&self) {
        self.builds_coalesced.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "builds_coalesced", "counter incremented");
    }

    pub fn inc_pushes_completed(&self) {
        self.pushes_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "pushes_completed", "counter incremented");
    }

    pub fn inc_pushes_failed(&self) {
        self.pushes_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "pushes_failed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            builds_invoked = self.builds_invoked(),
            builds_coalesced = self.builds_coalesced(),
            pushes_completed = self.pushes_completed(),
            pushes_failed = self.pushes_failed(),
        );
    }

    pub fn builds_invoked(&self) -> u64 {
        self.builds_invoked.load(Ordering::Relaxed)
    }

    pub fn builds_coalesced(&self) -> u64 {
        self.builds_coalesced.load(Ordering::Relaxed)
    }

    pub fn pushes_completed(&self) -> u64 {
        self.pushes_completed.load(Ordering::Relaxed)
    }

    pub fn pushes_failed(&self) -> u64 {
        self.pushes_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.builds_invoked.store(0, Ordering::Relaxed);
        self.builds_coalesced.store(0, Ordering::Relaxed);
        self.pushes_completed.store(0, Ordering::Relaxed);
        self.pushes_failed.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.builds_invoked(), 0);
        m.inc_builds_invoked();
        m.inc_builds_invoked();
        assert_eq!(m.builds_invoked(), 2);

        m.inc_builds_coalesced();
        assert_eq!(m.builds_coalesced(), 1);

        m.inc_pushes_completed();
        m.inc_pushes_failed();
        m.inc_pushes_failed();
        assert_eq!(m.pushes_completed(), 1);
        assert_eq!(m.pushes_failed(), 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_builds_invoked();
        m.inc_builds_coalesced();
        m.inc_pushes_completed();
        m.inc_pushes_failed();
        m.reset();
        assert_eq!(m.builds_invoked(), 0);
        assert_eq!(m.builds_coalesced(), 0);
        assert_eq!(m.pushes_completed(), 0);
        assert_eq!(m.pushes_failed(), 0);
    }
}
