//! Metrics for slotpool.
//!
//! Lightweight counters for observability.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-pool metrics counters.
pub struct Metrics {
    pub allocations_from_pool: AtomicU64,
    pub allocations_from_fallback: AtomicU64,
    pub frees_to_pool: AtomicU64,
    pub frees_to_fallback: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            allocations_from_pool: AtomicU64::new(0),
            allocations_from_fallback: AtomicU64::new(0),
            frees_to_pool: AtomicU64::new(0),
            frees_to_fallback: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_pool_allocation(&self) {
        self.allocations_from_pool.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fallback_allocation(&self) {
        self.allocations_from_fallback.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pool_free(&self) {
        self.frees_to_pool.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fallback_free(&self) {
        self.frees_to_fallback.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allocations_from_pool: self.allocations_from_pool.load(Ordering::Relaxed),
            allocations_from_fallback: self.allocations_from_fallback.load(Ordering::Relaxed),
            frees_to_pool: self.frees_to_pool.load(Ordering::Relaxed),
            frees_to_fallback: self.frees_to_fallback.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.allocations_from_pool.store(0, Ordering::Relaxed);
        self.allocations_from_fallback.store(0, Ordering::Relaxed);
        self.frees_to_pool.store(0, Ordering::Relaxed);
        self.frees_to_fallback.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub allocations_from_pool: u64,
    pub allocations_from_fallback: u64,
    pub frees_to_pool: u64,
    pub frees_to_fallback: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pool_alloc={} fallback_alloc={} pool_free={} fallback_free={}",
            self.allocations_from_pool,
            self.allocations_from_fallback,
            self.frees_to_pool,
            self.frees_to_fallback
        )
    }
}
