//! Gateway counters, served at `/metrics` in exposition format.
//!
//! Plain atomics, single global instance, no metrics crate.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // Ingress
    pub jobs_submitted: AtomicU64,
    pub upload_failures: AtomicU64,
    pub enqueue_failures: AtomicU64,

    // Status reads
    pub status_requests: AtomicU64,
    pub status_not_found: AtomicU64,

    // Live hub
    pub ws_connected: AtomicU64,
    pub ws_evicted: AtomicU64,

    // Event bus
    pub events_received: AtomicU64,
    pub events_forwarded: AtomicU64,
    pub events_dropped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            jobs_submitted: AtomicU64::new(0),
            upload_failures: AtomicU64::new(0),
            enqueue_failures: AtomicU64::new(0),
            status_requests: AtomicU64::new(0),
            status_not_found: AtomicU64::new(0),
            ws_connected: AtomicU64::new(0),
            ws_evicted: AtomicU64::new(0),
            events_received: AtomicU64::new(0),
            events_forwarded: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_jobs_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_upload_failures(&self) {
        self.upload_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_enqueue_failures(&self) {
        self.enqueue_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_status_requests(&self) {
        self.status_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_status_not_found(&self) {
        self.status_not_found.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_ws_connected(&self) {
        self.ws_connected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_ws_evicted(&self) {
        self.ws_evicted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_events_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_events_forwarded(&self) {
        self.events_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_events_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Format as Prometheus exposition format.
    pub fn prometheus_format(&self) -> String {
        format!(
            r#"# HELP crucible_jobs_submitted_total Total jobs accepted by the ingress gate
# TYPE crucible_jobs_submitted_total counter
crucible_jobs_submitted_total {}

# HELP crucible_upload_failures_total Total artifact uploads that failed
# TYPE crucible_upload_failures_total counter
crucible_upload_failures_total {}

# HELP crucible_enqueue_failures_total Total queue publishes that failed after commit
# TYPE crucible_enqueue_failures_total counter
crucible_enqueue_failures_total {}

# HELP crucible_status_requests_total Total status lookups
# TYPE crucible_status_requests_total counter
crucible_status_requests_total {}

# HELP crucible_status_not_found_total Total status lookups for unknown jobs
# TYPE crucible_status_not_found_total counter
crucible_status_not_found_total {}

# HELP crucible_ws_connected_total Total websocket viewers attached
# TYPE crucible_ws_connected_total counter
crucible_ws_connected_total {}

# HELP crucible_ws_evicted_total Total viewers replaced by a newer subscription
# TYPE crucible_ws_evicted_total counter
crucible_ws_evicted_total {}

# HELP crucible_events_received_total Total events read from the bus
# TYPE crucible_events_received_total counter
crucible_events_received_total {}

# HELP crucible_events_forwarded_total Total events delivered to a live viewer
# TYPE crucible_events_forwarded_total counter
crucible_events_forwarded_total {}

# HELP crucible_events_dropped_total Total events with no subscribed viewer
# TYPE crucible_events_dropped_total counter
crucible_events_dropped_total {}
"#,
            self.jobs_submitted.load(Ordering::Relaxed),
            self.upload_failures.load(Ordering::Relaxed),
            self.enqueue_failures.load(Ordering::Relaxed),
            self.status_requests.load(Ordering::Relaxed),
            self.status_not_found.load(Ordering::Relaxed),
            self.ws_connected.load(Ordering::Relaxed),
            self.ws_evicted.load(Ordering::Relaxed),
            self.events_received.load(Ordering::Relaxed),
            self.events_forwarded.load(Ordering::Relaxed),
            self.events_dropped.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.inc_jobs_submitted();
        metrics.inc_events_dropped();
        metrics.inc_events_dropped();

        let output = metrics.prometheus_format();
        assert!(output.contains("crucible_jobs_submitted_total 1"));
        assert!(output.contains("crucible_events_dropped_total 2"));
        assert!(output.contains("# TYPE crucible_ws_evicted_total counter"));
    }
}
