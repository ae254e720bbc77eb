//! Worker pipeline counters.
//!
//! Lock-free atomics, single global instance, snapshot logged at
//! shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    pub jobs_claimed: AtomicU64,
    pub jobs_completed: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_rejected: AtomicU64,
    pub redeliveries_acked: AtomicU64,
    pub malformed_dropped: AtomicU64,
    pub events_published: AtomicU64,
    pub event_publish_failures: AtomicU64,
    pub db_errors: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            jobs_claimed: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_rejected: AtomicU64::new(0),
            redeliveries_acked: AtomicU64::new(0),
            malformed_dropped: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            event_publish_failures: AtomicU64::new(0),
            db_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_jobs_claimed(&self) {
        self.jobs_claimed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_rejected(&self) {
        self.jobs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_redeliveries_acked(&self) {
        self.redeliveries_acked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_malformed_dropped(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_events_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_event_publish_failures(&self) {
        self.event_publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_db_errors(&self) {
        self.db_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_claimed: self.jobs_claimed.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_rejected: self.jobs_rejected.load(Ordering::Relaxed),
            redeliveries_acked: self.redeliveries_acked.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            event_publish_failures: self.event_publish_failures.load(Ordering::Relaxed),
            db_errors: self.db_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub jobs_claimed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_rejected: u64,
    pub redeliveries_acked: u64,
    pub malformed_dropped: u64,
    pub events_published: u64,
    pub event_publish_failures: u64,
    pub db_errors: u64,
}

impl MetricsSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "Jobs: {} claimed, {} completed, {} failed ({} rejected by scan) | \
             {} idempotent ack(s), {} malformed dropped | \
             Events: {} published, {} failed | DB errors: {}",
            self.jobs_claimed,
            self.jobs_completed,
            self.jobs_failed,
            self.jobs_rejected,
            self.redeliveries_acked,
            self.malformed_dropped,
            self.events_published,
            self.event_publish_failures,
            self.db_errors,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();
        metrics.inc_jobs_claimed();
        metrics.inc_jobs_claimed();
        metrics.inc_jobs_rejected();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_claimed, 2);
        assert_eq!(snapshot.jobs_rejected, 1);
        assert!(snapshot.summary().contains("2 claimed"));
    }
}
