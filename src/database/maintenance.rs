//! Storage maintenance worker
//!
//! Keeps the database file inside its configured budget with two modes:
//!
//! - **Compact**: the file is over budget but mostly empty space (more
//!   than half). Checkpoint the WAL, then rebuild the file in place.
//! - **Prune**: the file is over budget and genuinely full. Delete the
//!   least-recently-updated assets in small batches until the logical
//!   size drops to 85% of the budget, sleeping between batches so queued
//!   writers get the connection.
//!
//! Below the budget nothing happens: freed pages stay allocated so SQLite
//! can reuse them without new file allocations.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::cache::MemoryCache;
use crate::database::Database;
use crate::services::ServiceStats;
use crate::utils::human_format::format_bytes;

/// Fraction of empty space that flips the worker into compact mode.
const BLOAT_RATIO: f64 = 0.50;

/// Prune drains the logical size down to this fraction of the budget.
const PRUNE_TARGET_RATIO: f64 = 0.85;

const PRUNE_BATCH: u32 = 50;
const PRUNE_BATCH_PAUSE: Duration = Duration::from_millis(50);
const PRUNE_LOOP_GUARD: usize = 1000;

pub struct StorageCleaner {
    database: Database,
    stats: Arc<ServiceStats>,
    cache: Arc<MemoryCache>,
    max_bytes: u64,
    interval: Duration,
}

impl StorageCleaner {
    pub fn new(
        database: Database,
        stats: Arc<ServiceStats>,
        cache: Arc<MemoryCache>,
        max_bytes: u64,
        interval: Duration,
    ) -> Self {
        Self {
            database,
            stats,
            cache,
            max_bytes,
            interval,
        }
    }

    /// Runs forever: once immediately at startup, then on every interval
    /// tick. Errors are logged and the loop continues.
    pub async fn run(self) {
        info!(
            "storage cleaner started: limit {}, interval {:?}",
            format_bytes(self.max_bytes),
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!("storage maintenance tick failed: {e}");
            }
        }
    }

    async fn tick(&self) -> crate::errors::AppResult<()> {
        let physical = self.database.physical_size().await?;

        // Hysteresis: under the limit we deliberately keep the allocated
        // space for future writes.
        if physical < self.max_bytes {
            return Ok(());
        }

        let logical = self.database.logical_size().await?.max(0) as u64;
        let empty = physical.saturating_sub(logical);
        let bloated = empty as f64 > physical as f64 * BLOAT_RATIO;

        info!(
            "storage analysis - phys: {} | logic: {} | free: {}",
            format_bytes(physical),
            format_bytes(logical),
            format_bytes(empty)
        );

        if bloated {
            warn!("database is bloated (>50% empty), rebuilding file to reclaim space");
            self.database.checkpoint().await?;

            let start = std::time::Instant::now();
            match self.database.compact().await {
                Ok(()) => info!("compact completed in {:?}, disk space reclaimed", start.elapsed()),
                Err(e) => error!("compact failed: {e}"),
            }
            return Ok(());
        }

        let target = (self.max_bytes as f64 * PRUNE_TARGET_RATIO) as u64;
        let mut bytes_to_remove = logical.saturating_sub(target) as i64;
        if bytes_to_remove <= 0 {
            return Ok(());
        }

        info!(
            "storage limit reached, pruning ~{} of old data",
            format_bytes(bytes_to_remove as u64)
        );

        let mut deleted = 0usize;
        for _ in 0..PRUNE_LOOP_GUARD {
            if bytes_to_remove <= 0 {
                break;
            }

            let batch = match self.database.oldest_assets(PRUNE_BATCH).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!("prune fetch failed: {e}");
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }

            let ids: Vec<String> = batch.iter().map(|(id, _)| id.clone()).collect();
            if let Err(e) = self.database.delete_assets(&ids).await {
                error!("prune delete failed: {e}");
                break;
            }

            for (id, size) in &batch {
                self.stats.remove_asset(*size);
                self.cache.delete(&format!("img:{id}"));
                bytes_to_remove -= size;
            }
            deleted += batch.len();

            // Give queued writers a chance at the connection
            tokio::time::sleep(PRUNE_BATCH_PAUSE).await;
        }

        info!("pruning complete, removed {deleted} items");
        Ok(())
    }
}
