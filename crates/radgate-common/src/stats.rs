//! Atomic stat counters

use std::sync::atomic::{AtomicU64, Ordering};

/// A named set of monotonically increasing counters.
///
/// One instance per component; cheap enough to bump on every request.
#[derive(Debug, Default)]
pub struct CounterSet {
    /// Requests accepted / operations succeeded
    pub accepted: AtomicU64,
    /// Requests rejected / operations refused
    pub rejected: AtomicU64,
    /// Operations dropped (best-effort paths)
    pub dropped: AtomicU64,
    /// Anomalies observed (duplicates, orphans)
    pub anomalies: AtomicU64,
    /// Internal errors
    pub errors: AtomicU64,
}

impl CounterSet {
    /// New counter set, all zero
    pub const fn new() -> Self {
        Self {
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            anomalies: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Bump the accepted counter
    #[inline]
    pub fn inc_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Bump the rejected counter
    #[inline]
    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Bump the dropped counter
    #[inline]
    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Bump the anomaly counter
    #[inline]
    pub fn inc_anomalies(&self) {
        self.anomalies.fetch_add(1, Ordering::Relaxed);
    }

    /// Bump the error counter
    #[inline]
    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time snapshot
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of a [`CounterSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Accepted count
    pub accepted: u64,
    /// Rejected count
    pub rejected: u64,
    /// Dropped count
    pub dropped: u64,
    /// Anomaly count
    pub anomalies: u64,
    /// Error count
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let c = CounterSet::new();
        c.inc_accepted();
        c.inc_accepted();
        c.inc_anomalies();
        let snap = c.snapshot();
        assert_eq!(snap.accepted, 2);
        assert_eq!(snap.anomalies, 1);
        assert_eq!(snap.rejected, 0);
    }
}
