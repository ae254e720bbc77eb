//! Sandbox launch counters.
//!
//! Lock-free atomics, single global instance. The interesting counter is
//! `launches`: a scan-rejected job must never increment it.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    pub launches: AtomicU64,
    pub clean_exits: AtomicU64,
    pub nonzero_exits: AtomicU64,
    pub timeouts: AtomicU64,
    pub system_errors: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            launches: AtomicU64::new(0),
            clean_exits: AtomicU64::new(0),
            nonzero_exits: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            system_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_launches(&self) {
        self.launches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_clean_exits(&self) {
        self.clean_exits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_nonzero_exits(&self) {
        self.nonzero_exits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_timeouts(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_system_errors(&self) {
        self.system_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            launches: self.launches.load(Ordering::Relaxed),
            clean_exits: self.clean_exits.load(Ordering::Relaxed),
            nonzero_exits: self.nonzero_exits.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            system_errors: self.system_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub launches: u64,
    pub clean_exits: u64,
    pub nonzero_exits: u64,
    pub timeouts: u64,
    pub system_errors: u64,
}

impl MetricsSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "Sandbox: {} launched, {} clean, {} non-zero, {} timed out, {} system errors",
            self.launches, self.clean_exits, self.nonzero_exits, self.timeouts, self.system_errors,
        )
    }
}
