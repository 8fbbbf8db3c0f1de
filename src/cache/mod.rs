//! Cache Module
//!
//! The `Cache` facade and its two engines: an in-process table with TTL
//! expiry (`MemoryCache`) and a Redis-backed adapter (`RedisCache`).
//!
//! Every operation is async. Callers bound a call by wrapping the future in
//! `tokio::time::timeout` or racing it in `tokio::select!`; dropping the
//! future cancels the in-flight operation.

pub mod codec;
mod entry;
mod factory;
mod memory;
mod redis_cache;
mod stats;
mod value;


use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CacheError, Result};

// Re-export public types
pub use entry::CacheEntry;
pub use factory::{create_cache, CacheFactory};
pub use memory::{MemoryCache, MemoryTable};
pub use redis_cache::{PoolStatus, RedisCache};
pub use stats::CacheStats;
pub use value::CacheValue;

// == Cache Facade ==
/// Operations shared by every cache engine.
///
/// A `ttl` of `Duration::ZERO` means "never expires". Keys are plain strings;
/// the remote engine namespaces them with its configured prefix while the
/// in-process engine uses them verbatim.
#[async_trait]
pub trait Cache: Send + Sync {
    // -- Scalar --

    /// Returns the text form of the value stored at `key`.
    async fn get(&self, key: &str) -> Result<String>;

    /// Stores `value` at `key`, unconditionally replacing what was there.
    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<()>;

    /// Removes `key`. Absent keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    // -- Batch --

    /// Looks up every key; the output is aligned with `keys`, `None` marking
    /// absent entries.
    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<String>>>;

    /// Stores every pair with the same `ttl`.
    async fn mset(&self, pairs: HashMap<String, CacheValue>, ttl: Duration) -> Result<()>;

    async fn mdelete(&self, keys: &[&str]) -> Result<()>;

    // -- Counters --

    /// Adds `delta` to the integer at `key`, treating an absent key as zero.
    ///
    /// Fails with `NotNumeric` when the stored value is not an integer.
    async fn increment(&self, key: &str, delta: i64) -> Result<i64>;

    async fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        let negated = delta.checked_neg().ok_or_else(|| {
            CacheError::InvalidArgument(format!("cannot negate decrement {}", delta))
        })?;
        self.increment(key, negated).await
    }

    // -- Expiry --

    /// Sets or replaces the expiry of an existing key. A zero `ttl` expires
    /// the key immediately.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Remaining lifetime of `key`; `None` means the key never expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    // -- Hash --

    async fn hget(&self, key: &str, field: &str) -> Result<String>;

    /// Sets fields on the hash at `key`, creating the hash if absent.
    async fn hset(&self, key: &str, fields: HashMap<String, CacheValue>) -> Result<()>;

    /// All fields of the hash at `key`; empty when the key is absent.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn hdelete(&self, key: &str, fields: &[&str]) -> Result<()>;

    // -- List --

    /// Pushes each value onto the head of the list, in argument order.
    async fn lpush(&self, key: &str, values: Vec<CacheValue>) -> Result<()>;

    /// Appends each value to the tail of the list, in argument order.
    async fn rpush(&self, key: &str, values: Vec<CacheValue>) -> Result<()>;

    async fn lpop(&self, key: &str) -> Result<String>;

    async fn rpop(&self, key: &str) -> Result<String>;

    /// Elements `start..=stop`; negative indices count from the end.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    // -- Set --

    async fn sadd(&self, key: &str, members: Vec<CacheValue>) -> Result<()>;

    async fn srem(&self, key: &str, members: Vec<CacheValue>) -> Result<()>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    async fn sismember(&self, key: &str, member: CacheValue) -> Result<bool>;

    // -- Lifecycle --

    /// Performs a live round trip to the backing resource.
    async fn health_check(&self) -> Result<()>;

    /// Releases engine resources. Repeat calls are no-ops.
    fn close(&self) -> Result<()>;

    /// Statistics for engines that keep them.
    async fn stats(&self) -> Option<CacheStats> {
        None
    }
}
