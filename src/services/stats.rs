//! Process-wide asset counters
//!
//! Plain atomics with no lock coupling to the store. Counters are seeded
//! from the database at startup and adjusted only after a transaction
//! commits, so `total == count(assets)` and `bytes == Σ assets.size` hold
//! after every successful mutation.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

pub struct ServiceStats {
    started_at: Instant,
    total_count: AtomicI64,
    total_bytes: AtomicI64,
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_count: AtomicI64::new(0),
            total_bytes: AtomicI64::new(0),
        }
    }

    /// Seeds the counters from the store at startup.
    pub fn seed(&self, count: i64, bytes: i64) {
        self.total_count.store(count, Ordering::Relaxed);
        self.total_bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn add_asset(&self, size: i64) {
        self.total_count.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
    }

    pub fn remove_asset(&self, size: i64) {
        self.total_count.fetch_sub(1, Ordering::Relaxed);
        self.total_bytes.fetch_sub(size, Ordering::Relaxed);
    }

    /// In-place update: count unchanged, bytes adjusted by the delta.
    pub fn replace_asset(&self, old_size: i64, new_size: i64) {
        self.total_bytes
            .fetch_add(new_size - old_size, Ordering::Relaxed);
    }

    pub fn totals(&self) -> (i64, i64) {
        (
            self.total_count.load(Ordering::Relaxed),
            self.total_bytes.load(Ordering::Relaxed),
        )
    }

    pub fn uptime_seconds(&self) -> i64 {
        self.started_at.elapsed().as_secs() as i64
    }
}
