//! Observability counters (metrics snapshot for the status endpoint)

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_scheduled: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_postponed: AtomicU64,
    conflicts_detected: AtomicU64,
    conflicts_resolved: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_scheduled(&self) {
        self.jobs_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_postponed(&self) {
        self.jobs_postponed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn conflicts_detected(&self, count: u64) {
        self.conflicts_detected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn conflicts_resolved(&self, count: u64) {
        self.conflicts_resolved.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_scheduled: self.jobs_scheduled.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_postponed: self.jobs_postponed.load(Ordering::Relaxed),
            conflicts_detected: self.conflicts_detected.load(Ordering::Relaxed),
            conflicts_resolved: self.conflicts_resolved.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub jobs_scheduled: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_postponed: u64,
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
}
