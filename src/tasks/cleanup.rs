//! TTL Sweep Task
//!
//! Background task that periodically removes expired entries from an
//! in-process cache table.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::MemoryTable;

/// Spawns the sweep task for `table`.
///
/// One task runs the sweeps back to back, so a slow sweep delays the next
/// tick instead of overlapping it; ticks missed meanwhile are skipped. The
/// task exits as soon as `shutdown` is cancelled.
///
/// # Example
/// ```ignore
/// let table = Arc::new(MemoryTable::default());
/// let shutdown = CancellationToken::new();
/// let handle = spawn_cleanup_task(table, Duration::from_secs(60), shutdown.clone());
/// // Later, during close:
/// shutdown.cancel();
/// ```
pub fn spawn_cleanup_task(
    table: Arc<MemoryTable>,
    cleanup_interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting TTL sweep task with interval of {:?}",
            cleanup_interval
        );

        let Some(first_tick) = Instant::now().checked_add(cleanup_interval) else {
            warn!(
                "Cleanup interval {:?} is out of range, TTL sweep disabled",
                cleanup_interval
            );
            shutdown.cancelled().await;
            return;
        };
        let mut ticker = time::interval_at(first_tick, cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let removed = table.sweep_expired().await;

            if removed > 0 {
                info!("TTL sweep: removed {} expired entries", removed);
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }

        debug!("TTL sweep task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, MemoryCache};
    use crate::config::CacheConfig;

    fn config_with_interval(interval: Duration) -> CacheConfig {
        CacheConfig {
            driver: "memory".to_string(),
            cleanup_interval: interval,
            ..CacheConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_expired_entries() {
        let cache = MemoryCache::new(&config_with_interval(Duration::from_secs(1))).unwrap();
        cache
            .set("expire_soon", "value".into(), Duration::from_millis(500))
            .await
            .unwrap();

        // Past the TTL and past one sweep tick, without any read in between
        time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(cache.len().await, 0, "Expired entry should have been swept");
        assert_eq!(cache.snapshot().await.expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_preserves_valid_entries() {
        let cache = MemoryCache::new(&config_with_interval(Duration::from_secs(1))).unwrap();
        cache
            .set("long_lived", "value".into(), Duration::from_secs(3600))
            .await
            .unwrap();
        cache.set("forever", "value".into(), Duration::ZERO).await.unwrap();

        time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("long_lived").await.unwrap(), "value");
    }

    #[tokio::test]
    async fn test_sweep_task_stops_on_cancel() {
        let table = Arc::new(MemoryTable::default());
        let shutdown = CancellationToken::new();
        let handle = spawn_cleanup_task(table, Duration::from_secs(1), shutdown.clone());

        shutdown.cancel();

        time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweep task should exit promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_expired_counts_removed() {
        let table = MemoryTable::default();
        assert_eq!(table.sweep_expired().await, 0);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_out_of_range_interval_waits_for_shutdown() {
        let table = Arc::new(MemoryTable::default());
        let shutdown = CancellationToken::new();
        let handle = spawn_cleanup_task(table, Duration::MAX, shutdown.clone());

        time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
