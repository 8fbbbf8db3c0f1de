//! Remote-Store Cache Engine
//!
//! Forwards every operation to a Redis server through a `deadpool-redis`
//! connection pool. Keys are namespaced with the configured prefix and values
//! go through the codec before they are sent.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{self, ErrorKind, FromRedisValue, RedisError, RedisResult};
use deadpool_redis::{Config, Connection, Pool, PoolConfig, PoolError, Runtime, Timeouts};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::codec;
use crate::cache::{Cache, CacheValue};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_idle_reaper, ConnectionLimits};

// == Retry Policy ==
/// Exponential backoff for connection acquisition.
#[derive(Debug, Clone)]
struct RetryPolicy {
    max_retries: u32,
    min_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): the minimum backoff
    /// doubled per attempt, capped at the maximum.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.min_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

// == Pool Status ==
/// Connection pool occupancy, reported by health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max_size: usize,
    /// Connections currently open
    pub size: usize,
    /// Connections checked out by callers
    pub in_use: usize,
    /// Open connections waiting in the pool
    pub idle: usize,
}

// == Redis Cache ==
/// Redis-backed cache engine.
pub struct RedisCache {
    pool: Pool,
    prefix: String,
    read_timeout: Duration,
    write_timeout: Duration,
    retry: RetryPolicy,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl RedisCache {
    // == Constructor ==
    /// Builds the pool and verifies the server answers a PING.
    ///
    /// No engine is returned unless the round trip succeeds within the dial
    /// timeout.
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        let mut config = config.clone();
        config.set_defaults();

        let mut timeouts = Timeouts::default();
        timeouts.wait = Some(config.pool_timeout);
        timeouts.create = Some(config.dial_timeout);
        timeouts.recycle = Some(config.dial_timeout);

        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts = timeouts;

        let connection_info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: redis::RedisConnectionInfo {
                db: config.database,
                password: (!config.password.is_empty()).then(|| config.password.clone()),
                ..Default::default()
            },
        };
        let mut settings = Config::from_connection_info(connection_info);
        settings.pool = Some(pool_config);

        let pool = settings
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::ConnectionFailure(format!("Failed to create pool: {}", e)))?;

        let cache = Self {
            pool,
            prefix: config.prefix.clone(),
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                min_backoff: config.min_retry_backoff,
                max_backoff: config.max_retry_backoff,
            },
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        };

        let connected = tokio::time::timeout(config.dial_timeout, cache.ping()).await;
        match connected {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                cache.pool.close();
                return Err(CacheError::ConnectionFailure(format!(
                    "Failed to connect to redis at {}: {}",
                    config.address(),
                    e
                )));
            }
            Err(_) => {
                cache.pool.close();
                return Err(CacheError::ConnectionFailure(format!(
                    "Timed out connecting to redis at {} after {:?}",
                    config.address(),
                    config.dial_timeout
                )));
            }
        }

        cache.warm_up(config.min_idle_conns.min(config.pool_size)).await;
        spawn_idle_reaper(
            cache.pool.clone(),
            ConnectionLimits {
                max_age: config.max_conn_age,
                idle_timeout: config.idle_timeout,
            },
            config.idle_check_freq,
            cache.shutdown.clone(),
        );

        info!(
            "Redis cache connected: address={}, database={}, pool_size={}, prefix='{}'",
            config.address(),
            config.database,
            config.pool_size,
            config.prefix
        );

        Ok(cache)
    }

    /// Opens up to `count` connections and parks them in the pool as idle.
    async fn warm_up(&self, count: usize) {
        let mut held = Vec::with_capacity(count);
        for _ in 0..count {
            match self.pool.get().await {
                Ok(conn) => held.push(conn),
                Err(e) => {
                    warn!("Redis pool warm-up stopped early: {}", e);
                    break;
                }
            }
        }
        debug!("Redis pool warmed with {} idle connections", held.len());
    }

    // == Key Namespacing ==
    /// `prefix:key`, or the key unchanged when no prefix is configured.
    pub fn namespaced(prefix: &str, key: &str) -> String {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", prefix, key)
        }
    }

    fn key(&self, key: &str) -> String {
        Self::namespaced(&self.prefix, key)
    }

    fn keys(&self, keys: &[&str]) -> Vec<String> {
        keys.iter().map(|key| self.key(key)).collect()
    }

    // == Pool Status ==
    pub fn pool_status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            in_use: status.size.saturating_sub(status.available),
            idle: status.available,
        }
    }

    /// Checks a connection out of the pool, retrying connection failures
    /// with exponential backoff.
    async fn conn(&self) -> Result<Connection> {
        let mut attempt = 0;
        loop {
            match self.pool.get().await {
                Ok(conn) => return Ok(conn),
                Err(PoolError::Backend(e)) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for_attempt(attempt);
                    debug!(
                        "Redis connection attempt {} failed ({}), retrying in {:?}",
                        attempt, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(pool_error(e)),
            }
        }
    }

    /// Awaits a command under `deadline`, mapping client errors.
    async fn within<T: Send>(
        &self,
        deadline: Duration,
        op: &str,
        key: &str,
        fut: impl Future<Output = RedisResult<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(deadline, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(e, op, key)),
            Err(_) => Err(CacheError::Timeout(format!(
                "{} '{}' exceeded {:?}",
                op, key, deadline
            ))),
        }
    }

    async fn read<T: FromRedisValue + Send>(&self, op: &str, key: &str, cmd: redis::Cmd) -> Result<T> {
        let mut conn = self.conn().await?;
        self.within(self.read_timeout, op, key, cmd.query_async::<T>(&mut *conn))
            .await
    }

    async fn write<T: FromRedisValue + Send>(&self, op: &str, key: &str, cmd: redis::Cmd) -> Result<T> {
        let mut conn = self.conn().await?;
        self.within(self.write_timeout, op, key, cmd.query_async::<T>(&mut *conn))
            .await
    }

    async fn ping(&self) -> Result<()> {
        let pong: String = self.read("PING", "", redis::cmd("PING")).await?;
        if pong != "PONG" {
            return Err(CacheError::ConnectionFailure(format!(
                "Unexpected PING reply: {}",
                pong
            )));
        }
        Ok(())
    }
}

/// Command with the namespaced key as its first argument.
fn keyed(name: &str, key: String) -> redis::Cmd {
    let mut cmd = redis::cmd(name);
    cmd.arg(key);
    cmd
}

/// Millisecond TTL for `PX`/`PEXPIRE`; sub-millisecond TTLs round up so
/// they still expire rather than being rejected.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn encode_all(values: &[CacheValue]) -> Result<Vec<Vec<u8>>> {
    values.iter().map(codec::encode).collect()
}

// == Error Mapping ==
fn pool_error(err: PoolError) -> CacheError {
    match err {
        PoolError::Closed => CacheError::Closed,
        PoolError::Timeout(kind) => {
            CacheError::Timeout(format!("Redis pool timed out ({:?})", kind))
        }
        other => CacheError::ConnectionFailure(format!("Failed to get Redis connection: {}", other)),
    }
}

/// Maps a client error into the cache taxonomy.
fn classify(err: RedisError, op: &str, key: &str) -> CacheError {
    let text = err.to_string();
    if err.code() == Some("WRONGTYPE") || text.contains("WRONGTYPE") {
        return CacheError::WrongType(format!("{} '{}': {}", op, key, text));
    }
    if text.contains("not an integer") {
        return CacheError::NotNumeric(key.to_string());
    }
    match err.kind() {
        ErrorKind::TypeError => CacheError::Serialization(format!("{} '{}': {}", op, key, text)),
        ErrorKind::ResponseError | ErrorKind::ExtensionError => {
            CacheError::InvalidArgument(format!("{} '{}': {}", op, key, text))
        }
        _ if err.is_timeout() => CacheError::Timeout(format!("{} '{}': {}", op, key, text)),
        _ => CacheError::ConnectionFailure(format!("{} '{}' failed: {}", op, key, text)),
    }
}

impl Drop for RedisCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<String> {
        let value: Option<String> = self.read("GET", key, keyed("GET", self.key(key))).await?;
        match value {
            Some(value) => {
                debug!("Cache hit for key '{}'", key);
                Ok(value)
            }
            None => {
                debug!("Cache miss for key '{}'", key);
                Err(CacheError::NotFound(key.to_string()))
            }
        }
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<()> {
        let payload = codec::encode(&value)?;
        let mut cmd = keyed("SET", self.key(key));
        cmd.arg(payload.as_slice());
        if !ttl.is_zero() {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        self.write::<()>("SET", key, cmd).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.write::<i64>("DEL", key, keyed("DEL", self.key(key)))
            .await
            .map(|_| ())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let count: i64 = self.read("EXISTS", key, keyed("EXISTS", self.key(key))).await?;
        Ok(count > 0)
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = redis::cmd("MGET");
        cmd.arg(self.keys(keys));
        self.read("MGET", &keys.join(","), cmd).await
    }

    async fn mset(&self, pairs: HashMap<String, CacheValue>, ttl: Duration) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        // Encode everything before anything is sent
        let encoded = pairs
            .iter()
            .map(|(key, value)| Ok((self.key(key), codec::encode(value)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, payload) in &encoded {
            let cmd = pipe.cmd("SET").arg(key).arg(payload.as_slice());
            if !ttl.is_zero() {
                cmd.arg("PX").arg(ttl_millis(ttl));
            }
            cmd.ignore();
        }

        let mut conn = self.conn().await?;
        let label = format!("{} keys", encoded.len());
        self.within(
            self.write_timeout,
            "MSET",
            &label,
            pipe.query_async::<()>(&mut *conn),
        )
        .await
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("DEL");
        cmd.arg(self.keys(keys));
        self.write::<i64>("DEL", &keys.join(","), cmd)
            .await
            .map(|_| ())
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let mut cmd = keyed("INCRBY", self.key(key));
        cmd.arg(delta);
        self.write("INCRBY", key, cmd).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut cmd = keyed("PEXPIRE", self.key(key));
        cmd.arg(if ttl.is_zero() { 0 } else { ttl_millis(ttl) });
        let applied: i64 = self.write("PEXPIRE", key, cmd).await?;
        if applied == 0 {
            return Err(CacheError::NotFound(key.to_string()));
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let millis: i64 = self.read("PTTL", key, keyed("PTTL", self.key(key))).await?;
        match millis {
            -2 => Err(CacheError::NotFound(key.to_string())),
            -1 => Ok(None),
            ms => Ok(Some(Duration::from_millis(ms.max(0) as u64))),
        }
    }

    async fn hget(&self, key: &str, field: &str) -> Result<String> {
        let mut cmd = keyed("HGET", self.key(key));
        cmd.arg(field);
        let value: Option<String> = self.read("HGET", key, cmd).await?;
        value.ok_or_else(|| CacheError::NotFound(format!("{}.{}", key, field)))
    }

    async fn hset(&self, key: &str, fields: HashMap<String, CacheValue>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut cmd = keyed("HSET", self.key(key));
        for (field, value) in &fields {
            cmd.arg(field).arg(codec::encode(value)?.as_slice());
        }
        self.write::<i64>("HSET", key, cmd).await.map(|_| ())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.read("HGETALL", key, keyed("HGETALL", self.key(key)))
            .await
    }

    async fn hdelete(&self, key: &str, fields: &[&str]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut cmd = keyed("HDEL", self.key(key));
        cmd.arg(fields);
        self.write::<i64>("HDEL", key, cmd).await.map(|_| ())
    }

    async fn lpush(&self, key: &str, values: Vec<CacheValue>) -> Result<()> {
        self.push("LPUSH", key, &values).await
    }

    async fn rpush(&self, key: &str, values: Vec<CacheValue>) -> Result<()> {
        self.push("RPUSH", key, &values).await
    }

    async fn lpop(&self, key: &str) -> Result<String> {
        let value: Option<String> = self.write("LPOP", key, keyed("LPOP", self.key(key))).await?;
        value.ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    async fn rpop(&self, key: &str) -> Result<String> {
        let value: Option<String> = self.write("RPOP", key, keyed("RPOP", self.key(key))).await?;
        value.ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let mut cmd = keyed("LRANGE", self.key(key));
        cmd.arg(start).arg(stop);
        self.read("LRANGE", key, cmd).await
    }

    async fn sadd(&self, key: &str, members: Vec<CacheValue>) -> Result<()> {
        self.members_cmd("SADD", key, &members).await
    }

    async fn srem(&self, key: &str, members: Vec<CacheValue>) -> Result<()> {
        self.members_cmd("SREM", key, &members).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.read("SMEMBERS", key, keyed("SMEMBERS", self.key(key)))
            .await
    }

    async fn sismember(&self, key: &str, member: CacheValue) -> Result<bool> {
        let mut cmd = keyed("SISMEMBER", self.key(key));
        cmd.arg(codec::encode(&member)?.as_slice());
        let found: i64 = self.read("SISMEMBER", key, cmd).await?;
        Ok(found == 1)
    }

    async fn health_check(&self) -> Result<()> {
        if let Err(e) = self.ping().await {
            warn!("Redis health check failed: {}", e);
            return Err(e);
        }
        let status = self.pool_status();
        info!(
            "Redis connection pool stats: size={}, in_use={}, idle={}, max_size={}",
            status.size, status.in_use, status.idle, status.max_size
        );
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown.cancel();
        self.pool.close();
        info!("Redis cache closed");
        Ok(())
    }
}

impl RedisCache {
    async fn push(&self, op: &str, key: &str, values: &[CacheValue]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut cmd = keyed(op, self.key(key));
        for payload in encode_all(values)? {
            cmd.arg(payload.as_slice());
        }
        self.write::<i64>(op, key, cmd).await.map(|_| ())
    }

    async fn members_cmd(&self, op: &str, key: &str, members: &[CacheValue]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut cmd = keyed(op, self.key(key));
        for payload in encode_all(members)? {
            cmd.arg(payload.as_slice());
        }
        self.write::<i64>(op, key, cmd).await.map(|_| ())
    }
}
