//! Idle Connection Reaper
//!
//! Background task that drops pooled Redis connections once they are too old
//! or have sat unused for too long.

use std::time::Duration;

use deadpool_redis::Pool;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Connection age and idle limits. A zero limit disables that check.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_age: Duration,
    pub idle_timeout: Duration,
}

impl ConnectionLimits {
    /// Whether a connection created `age` ago and last handed out `idle` ago
    /// may stay in the pool.
    pub fn keep(&self, age: Duration, idle: Duration) -> bool {
        let young = self.max_age.is_zero() || age < self.max_age;
        let active = self.idle_timeout.is_zero() || idle < self.idle_timeout;
        young && active
    }
}

/// Spawns the reaper for `pool`, running every `check_freq` until `shutdown`
/// is cancelled.
pub fn spawn_idle_reaper(
    pool: Pool,
    limits: ConnectionLimits,
    check_freq: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(first_tick) = Instant::now().checked_add(check_freq) else {
            warn!(
                "Idle check frequency {:?} is out of range, connection reaping disabled",
                check_freq
            );
            shutdown.cancelled().await;
            return;
        };
        let mut ticker = time::interval_at(first_tick, check_freq);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = pool.retain(|_, metrics| limits.keep(metrics.age(), metrics.last_used()));

            if !result.removed.is_empty() {
                info!(
                    "Idle reaper: closed {} pooled connections, {} kept",
                    result.removed.len(),
                    result.retained
                );
            } else {
                debug!("Idle reaper: no connections past their limits");
            }
        }

        debug!("Idle reaper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: ConnectionLimits = ConnectionLimits {
        max_age: Duration::from_secs(3600),
        idle_timeout: Duration::from_secs(300),
    };

    #[test]
    fn test_fresh_connection_is_kept() {
        assert!(LIMITS.keep(Duration::from_secs(10), Duration::from_secs(1)));
    }

    #[test]
    fn test_old_or_idle_connection_is_dropped() {
        assert!(!LIMITS.keep(Duration::from_secs(3600), Duration::ZERO));
        assert!(!LIMITS.keep(Duration::from_secs(60), Duration::from_secs(300)));
    }

    #[test]
    fn test_zero_limit_disables_check() {
        let unlimited = ConnectionLimits {
            max_age: Duration::ZERO,
            idle_timeout: Duration::ZERO,
        };
        assert!(unlimited.keep(Duration::from_secs(u32::MAX as u64), Duration::from_secs(u32::MAX as u64)));
    }

    #[tokio::test]
    async fn test_reaper_stops_on_cancel() {
        let pool = deadpool_redis::Config::from_url("redis://127.0.0.1:1")
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap();
        let shutdown = CancellationToken::new();
        let handle = spawn_idle_reaper(pool, LIMITS, Duration::from_millis(10), shutdown.clone());

        time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());

        shutdown.cancel();
        time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reaper should exit promptly")
            .unwrap();
    }
}
