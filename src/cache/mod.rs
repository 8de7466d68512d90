//! In-memory blob cache
//!
//! A size-bounded, TTL-expiring map from opaque keys to byte buffers that
//! sits in front of the asset store. Entries above 512 KiB are never
//! admitted: large blobs are served straight from SQLite and the OS page
//! cache, while the heap is reserved for high-frequency small avatars.
//!
//! Concurrency: reads take a shared lock and never mutate (expired entries
//! are misses, not deletions); set/delete/prune/GC take the write lock.
//! `total_size == Σ entry.size` holds after every mutation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::utils::human_format::format_bytes;

/// Expired-entry sweep frequency.
pub const GC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Occupancy heartbeat frequency.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Entries above this size never enter the cache.
const MAX_ENTRY_SIZE: u64 = 512 * 1024;

/// Eviction drains the cache down to this fraction of capacity.
const PRUNE_TARGET_RATIO: f64 = 0.80;

struct Entry {
    data: Bytes,
    expires_at: Instant,
    size: u64,
}

struct Inner {
    items: HashMap<String, Entry>,
    total_size: u64,
}

pub struct MemoryCache {
    inner: RwLock<Inner>,
    max_size: u64,
    ttl: Duration,
    enabled: bool,
}

impl MemoryCache {
    pub fn new(enabled: bool, max_size_bytes: u64, ttl: Duration) -> Self {
        if enabled {
            info!(
                "memory cache initialized: {} limit, ttl {:?}",
                format_bytes(max_size_bytes),
                ttl
            );
        } else {
            warn!("memory cache is DISABLED via config (running in pass-through mode)");
        }

        Self {
            inner: RwLock::new(Inner {
                items: HashMap::new(),
                total_size: 0,
            }),
            max_size: max_size_bytes,
            ttl,
            enabled,
        }
    }

    /// Returns the entry when present and not expired. Never mutates.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        if !self.enabled {
            return None;
        }

        let inner = self.inner.read();
        let entry = inner.items.get(key)?;
        if Instant::now() > entry.expires_at {
            return None;
        }
        Some(entry.data.clone())
    }

    /// Stores a value under the configured TTL.
    ///
    /// Entries larger than half the capacity or above the 512 KiB admission
    /// threshold are silently discarded.
    pub fn set(&self, key: &str, data: Bytes) {
        if !self.enabled {
            return;
        }

        let size = data.len() as u64;
        if size > self.max_size / 2 || size > MAX_ENTRY_SIZE {
            return;
        }

        let mut inner = self.inner.write();

        if inner.total_size + size > self.max_size {
            self.prune(&mut inner);
        }

        if let Some(old) = inner.items.remove(key) {
            inner.total_size -= old.size;
        }

        inner.items.insert(
            key.to_string(),
            Entry {
                data,
                expires_at: Instant::now() + self.ttl,
                size,
            },
        );
        inner.total_size += size;
    }

    /// Removes an entry. Deleting a missing key is a no-op.
    pub fn delete(&self, key: &str) {
        if !self.enabled {
            return;
        }

        let mut inner = self.inner.write();
        if let Some(entry) = inner.items.remove(key) {
            inner.total_size -= entry.size;
        }
    }

    /// Current (entry count, used bytes).
    pub fn usage(&self) -> (usize, u64) {
        let inner = self.inner.read();
        (inner.items.len(), inner.total_size)
    }

    /// Evicts entries in ascending `expires_at` order until usage drops to
    /// the prune target. Caller holds the write lock.
    fn prune(&self, inner: &mut Inner) {
        if inner.items.is_empty() {
            return;
        }

        let target = (self.max_size as f64 * PRUNE_TARGET_RATIO) as u64;

        let mut candidates: Vec<(String, Instant, u64)> = inner
            .items
            .iter()
            .map(|(k, v)| (k.clone(), v.expires_at, v.size))
            .collect();
        candidates.sort_by_key(|(_, expires_at, _)| *expires_at);

        for (key, _, size) in candidates {
            if inner.total_size <= target {
                break;
            }
            inner.items.remove(&key);
            inner.total_size -= size;
        }
    }

    /// One sweep of the expired-entry collector.
    fn collect_expired(&self) -> (usize, u64) {
        let mut inner = self.inner.write();
        if inner.items.is_empty() {
            return (0, 0);
        }

        let now = Instant::now();
        let expired: Vec<String> = inner
            .items
            .iter()
            .filter(|(_, v)| now > v.expires_at)
            .map(|(k, _)| k.clone())
            .collect();

        let mut freed = 0u64;
        for key in &expired {
            if let Some(entry) = inner.items.remove(key) {
                inner.total_size -= entry.size;
                freed += entry.size;
            }
        }
        (expired.len(), freed)
    }

    /// Spawns the background GC and occupancy workers. No-op when the
    /// cache is disabled.
    pub fn spawn_workers(self: &Arc<Self>) {
        if !self.enabled {
            return;
        }

        let gc = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(GC_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (count, freed) = gc.collect_expired();
                if count > 0 {
                    info!("cache gc: cleaned {count} items ({} freed)", format_bytes(freed));
                }
            }
        });

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (count, used) = monitor.usage();
                if count == 0 {
                    continue;
                }
                let percent = used as f64 / monitor.max_size as f64 * 100.0;
                info!(
                    "cache: {count} items | usage: {} / {} ({percent:.2}%)",
                    format_bytes(used),
                    format_bytes(monitor.max_size),
                );
            }
        });

        debug!("cache workers started");
    }
}
