//! # Pool Metrics
//!
//! Lightweight counters describing how the pool hands out connections.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Use atomic counters to aggregate events cheaply.
//! 2. **Zero-Cost Access**: Expose snapshots as plain structs without heap work.
//!
//! `Ordering::Relaxed` is sufficient because no cross-field ordering is
//! required; gauges (`live`, `idle`) are read from the pool state instead.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Successful `acquire` calls.
    pub acquisitions: u64,
    /// Connections dialed (successful or not).
    pub dials: u64,
    /// Acquisitions served from the free list.
    pub reuses: u64,
    /// Connections closed on release or after a failed liveness check.
    pub discards: u64,
    /// Times an `acquire` had to block at the bound.
    pub waits: u64,
    /// Acquisitions that gave up with `PoolExhausted`.
    pub timeouts: u64,
    /// Connections currently owned by the pool (idle + lent out).
    pub live: u64,
    /// Connections currently sitting in free lists.
    pub idle: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PoolMetrics {
    acquisitions: AtomicU64,
    dials: AtomicU64,
    reuses: AtomicU64,
    discards: AtomicU64,
    waits: AtomicU64,
    timeouts: AtomicU64,
}

impl PoolMetrics {
    pub(crate) fn record_acquisition(&self, reused: bool) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        if reused {
            self.reuses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_dial(&self) {
        self.dials.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discard(&self) {
        self.discards.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wait(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, live: u64, idle: u64) -> PoolStats {
        PoolStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            dials: self.dials.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            discards: self.discards.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            live,
            idle,
        }
    }
}
