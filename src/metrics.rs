//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub admitted: u64,
    pub denied: u64,
    pub store_errors: u64,
    pub fail_open_admissions: u64,
    pub accrual_failures: u64,
}

/// Atomic counters; the engine is shared across request tasks.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    requests: AtomicU64,
    admitted: AtomicU64,
    denied: AtomicU64,
    store_errors: AtomicU64,
    fail_open_admissions: AtomicU64,
    accrual_failures: AtomicU64,
}

impl EngineMetrics {
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fail_open_admission(&self) {
        self.fail_open_admissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_accrual_failures(&self, count: u32) {
        self.accrual_failures
            .fetch_add(u64::from(count), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            fail_open_admissions: self.fail_open_admissions.load(Ordering::Relaxed),
            accrual_failures: self.accrual_failures.load(Ordering::Relaxed),
        }
    }
}
