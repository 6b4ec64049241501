//! Lifecycle counters.
//!
//! Counts what the lifecycle manager did during a test, including the
//! recoveries that are deliberately not surfaced as errors.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters describing patch lifecycle activity.
///
/// Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct LifecycleMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Substitutions installed, including re-installs
    installed: AtomicU64,
    /// Stopped patches started again
    started: AtomicU64,
    /// Active patches stopped
    stopped: AtomicU64,
    /// `set_result` calls
    refreshed: AtomicU64,
    /// Start or stop calls against handles the primitive lost track of
    stale_recovered: AtomicU64,
    /// Handles removed from the primitive's ledger by cleanup
    reconciled: AtomicU64,
    /// Patches built with both a return value and a side effect
    ambiguous_warnings: AtomicU64,
}

macro_rules! counter {
    ($record:ident, $read:ident, $field:ident) => {
        pub(crate) fn $record(&self) {
            self.inner.$field.fetch_add(1, Ordering::Relaxed);
        }

        #[doc = concat!("Number of `", stringify!($field), "` events recorded.")]
        pub fn $read(&self) -> u64 {
            self.inner.$field.load(Ordering::Relaxed)
        }
    };
}

impl LifecycleMetrics {
    /// Create a new set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_installed, installed, installed);
    counter!(record_started, started, started);
    counter!(record_stopped, stopped, stopped);
    counter!(record_refreshed, refreshed, refreshed);
    counter!(record_stale_recovered, stale_recovered, stale_recovered);
    counter!(record_reconciled, reconciled, reconciled);
    counter!(record_ambiguous, ambiguous_warnings, ambiguous_warnings);

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            installed: self.installed(),
            started: self.started(),
            stopped: self.stopped(),
            refreshed: self.refreshed(),
            stale_recovered: self.stale_recovered(),
            reconciled: self.reconciled(),
            ambiguous_warnings: self.ambiguous_warnings(),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.inner.installed,
            &self.inner.started,
            &self.inner.stopped,
            &self.inner.refreshed,
            &self.inner.stale_recovered,
            &self.inner.reconciled,
            &self.inner.ambiguous_warnings,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time snapshot of [`LifecycleMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Substitutions installed, including re-installs
    pub installed: u64,
    /// Stopped patches started again
    pub started: u64,
    /// Active patches stopped
    pub stopped: u64,
    /// `set_result` calls
    pub refreshed: u64,
    /// Start or stop calls against lost handles
    pub stale_recovered: u64,
    /// Handles removed from the primitive's ledger by cleanup
    pub reconciled: u64,
    /// Patches built with both a return value and a side effect
    pub ambiguous_warnings: u64,
}

impl MetricsSnapshot {
    /// Patches whose substitution is still in effect, assuming every install
    /// and start is eventually balanced by a stop.
    pub fn in_effect(&self) -> u64 {
        self.installed
            .saturating_add(self.started)
            .saturating_sub(self.stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initial_state() {
        let metrics = LifecycleMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_snapshot() {
        let metrics = LifecycleMetrics::new();
        metrics.record_installed();
        metrics.record_installed();
        metrics.record_stopped();
        metrics.record_stale_recovered();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.installed, 2);
        assert_eq!(snapshot.stopped, 1);
        assert_eq!(snapshot.stale_recovered, 1);
        assert_eq!(snapshot.in_effect(), 1);
    }

    #[test]
    fn test_reset() {
        let metrics = LifecycleMetrics::new();
        metrics.record_installed();
        metrics.record_reconciled();
        metrics.record_ambiguous();

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_clone_shares_counters() {
        let metrics1 = LifecycleMetrics::new();
        metrics1.record_started();

        let metrics2 = metrics1.clone();
        metrics2.record_started();

        assert_eq!(metrics1.started(), 2);
        assert_eq!(metrics2.started(), 2);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::thread;

        let metrics = LifecycleMetrics::new();
        let mut handles = vec![];

        for _ in 0..10 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    m.record_installed();
                    m.record_stopped();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.installed(), 1000);
        assert_eq!(metrics.stopped(), 1000);
    }
}
