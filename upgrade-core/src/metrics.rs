use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters for the proxy host and the interceptor
#[derive(Debug, Default)]
pub struct Metrics {
    pub total_requests: AtomicU64,
    /// Requests forwarded untouched because no active instance controls the client
    pub uncontrolled_requests: AtomicU64,
    pub rewritten: AtomicU64,
    pub passed_through: AtomicU64,
    pub fallbacks: AtomicU64,
    pub network_failures: AtomicU64,
    pub dispatch_failures: AtomicU64,
    /// Rewrites per allowlisted origin
    pub rewrites_by_origin: DashMap<String, u64>,
}

impl Metrics {
    pub fn record_rewrite(&self, origin: &str) {
        self.rewritten.fetch_add(1, Ordering::Relaxed);
        *self.rewrites_by_origin.entry(origin.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            uncontrolled_requests: self.uncontrolled_requests.load(Ordering::Relaxed),
            rewritten: self.rewritten.load(Ordering::Relaxed),
            passed_through: self.passed_through.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            network_failures: self.network_failures.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            rewrites_by_origin: self
                .rewrites_by_origin
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
        }
    }
}

/// Point-in-time copy of [`Metrics`], as served by the admin API
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub uncontrolled_requests: u64,
    pub rewritten: u64,
    pub passed_through: u64,
    pub fallbacks: u64,
    pub network_failures: u64,
    pub dispatch_failures: u64,
    pub rewrites_by_origin: BTreeMap<String, u64>,
}
