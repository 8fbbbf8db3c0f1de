//! In-Process Cache Engine
//!
//! One `HashMap` of entries behind a single tokio `RwLock`. Reads share the
//! lock; writes and the background sweep take it exclusively. Every read path
//! also checks expiry lazily and removes a stale entry on the spot.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::codec;
use crate::cache::stats::StatsRecorder;
use crate::cache::{Cache, CacheEntry, CacheStats, CacheValue};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_cleanup_task;

// == Memory Table ==
/// The entry table shared between the engine and its sweep task.
#[derive(Debug, Default)]
pub struct MemoryTable {
    entries: RwLock<HashMap<String, CacheEntry>>,
    stats: StatsRecorder,
}

impl MemoryTable {
    // == Sweep ==
    /// Removes every expired entry and returns how many were dropped.
    pub async fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - entries.len();
        self.stats.record_expirations(removed);
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Runs `f` against the live entry at `key` under the read lock.
    ///
    /// Returns `Ok(None)` when the key is absent. An expired entry is removed
    /// under the write lock and reported as absent.
    async fn read_live<T: Send>(
        &self,
        key: &str,
        f: impl FnOnce(&CacheEntry) -> Result<T> + Send,
    ) -> Result<Option<T>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => {
                    self.stats.record_miss();
                    return Ok(None);
                }
                Some(entry) if !entry.is_expired() => {
                    self.stats.record_hit();
                    return f(entry).map(Some);
                }
                Some(_) => {}
            }
        }
        self.stats.record_miss();
        self.evict_expired(&[key]).await;
        Ok(None)
    }

    /// Re-checks and removes the given keys if they are still expired.
    async fn evict_expired(&self, keys: &[&str]) {
        let mut entries = self.entries.write().await;
        for key in keys {
            purge_if_expired(&mut entries, &self.stats, key);
        }
    }
}

/// Drops the entry at `key` if it has expired. Write paths call this before
/// touching a key so that an expired value never leaks into a mutation.
fn purge_if_expired(entries: &mut HashMap<String, CacheEntry>, stats: &StatsRecorder, key: &str) {
    if entries.get(key).is_some_and(CacheEntry::is_expired) {
        entries.remove(key);
        stats.record_expirations(1);
        debug!("Lazily expired key '{}'", key);
    }
}

fn wrong_type(key: &str, expected: &str, found: &CacheValue) -> CacheError {
    CacheError::WrongType(format!(
        "key '{}' holds a {} value, expected {}",
        key,
        found.kind(),
        expected
    ))
}

fn texts(values: &[CacheValue]) -> Result<Vec<String>> {
    values.iter().map(codec::to_text).collect()
}

// == LRange Bounds ==
/// Resolves inclusive `start..=stop` (negative = from the end) against a list
/// of `len` elements. None when the clamped range is empty.
fn clamp_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let start = (if start < 0 { len.saturating_add(start) } else { start }).max(0);
    let stop = (if stop < 0 { len.saturating_add(stop) } else { stop }).min(len - 1);
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

// == Memory Cache ==
/// In-process cache engine.
///
/// The configured key prefix is ignored: keys are stored verbatim. The
/// memory ceiling is recorded but not enforced.
///
/// A hash, list or set shares its representation with a structured value
/// written through `set`, so `get` on a container key returns its JSON text.
/// The Redis engine answers the same call with `WrongType`.
pub struct MemoryCache {
    table: Arc<MemoryTable>,
    max_memory: u64,
    cleanup_interval: Duration,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MemoryCache {
    // == Constructor ==
    /// Creates the engine and starts its sweep task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            CacheError::InvalidArgument(
                "memory cache must be created inside a Tokio runtime".to_string(),
            )
        })?;

        let mut config = config.clone();
        config.set_defaults();

        let table = Arc::new(MemoryTable::default());
        let shutdown = CancellationToken::new();
        let sweeper = spawn_cleanup_task(table.clone(), config.cleanup_interval, shutdown.clone());

        info!(
            "Memory cache ready: max_memory={} bytes, cleanup_interval={:?}",
            config.max_memory, config.cleanup_interval
        );

        Ok(Self {
            table,
            max_memory: config.max_memory,
            cleanup_interval: config.cleanup_interval,
            shutdown,
            sweeper: Mutex::new(Some(sweeper)),
            closed: AtomicBool::new(false),
        })
    }

    /// Advisory memory ceiling in bytes.
    pub fn max_memory(&self) -> u64 {
        self.max_memory
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    // == Length ==
    /// Number of entries currently in the table, including expired entries
    /// not yet swept.
    pub async fn len(&self) -> usize {
        self.table.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Counter snapshot.
    pub async fn snapshot(&self) -> CacheStats {
        self.table.stats.snapshot(self.table.len().await)
    }

    /// Whether the sweep task has stopped.
    pub fn sweeper_finished(&self) -> bool {
        let guard = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<String> {
        self.table
            .read_live(key, |entry| codec::to_text(&entry.value))
            .await?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, ttl)?;
        let mut entries = self.table.entries.write().await;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.table.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.table.read_live(key, |_| Ok(())).await?.is_some())
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        let mut expired = Vec::new();
        {
            let entries = self.table.entries.read().await;
            let now = Instant::now();
            for key in keys {
                match entries.get(*key) {
                    Some(entry) if !entry.is_expired_at(now) => {
                        self.table.stats.record_hit();
                        values.push(Some(codec::to_text(&entry.value)?));
                    }
                    Some(_) => {
                        self.table.stats.record_miss();
                        expired.push(*key);
                        values.push(None);
                    }
                    None => {
                        self.table.stats.record_miss();
                        values.push(None);
                    }
                }
            }
        }
        if !expired.is_empty() {
            self.table.evict_expired(&expired).await;
        }
        Ok(values)
    }

    async fn mset(&self, pairs: HashMap<String, CacheValue>, ttl: Duration) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let fresh = pairs
            .into_iter()
            .map(|(key, value)| Ok((key, CacheEntry::new(value, ttl)?)))
            .collect::<Result<Vec<_>>>()?;
        let mut entries = self.table.entries.write().await;
        entries.extend(fresh);
        Ok(())
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut entries = self.table.entries.write().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let mut entries = self.table.entries.write().await;
        purge_if_expired(&mut entries, &self.table.stats, key);

        if !entries.contains_key(key) {
            entries.insert(key.to_string(), CacheEntry::persistent(CacheValue::Int(delta)));
            return Ok(delta);
        }
        let Some(entry) = entries.get_mut(key) else {
            return Err(CacheError::NotFound(key.to_string()));
        };

        if matches!(
            entry.value,
            CacheValue::List(_) | CacheValue::Map(_) | CacheValue::Set(_)
        ) {
            return Err(wrong_type(key, "an integer", &entry.value));
        }
        let current = entry
            .value
            .as_i64()
            .ok_or_else(|| CacheError::NotNumeric(key.to_string()))?;
        let updated = current.checked_add(delta).ok_or_else(|| {
            CacheError::InvalidArgument(format!("increment of '{}' would overflow", key))
        })?;
        // Expiry is left untouched
        entry.value = CacheValue::Int(updated);
        Ok(updated)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.table.entries.write().await;
        purge_if_expired(&mut entries, &self.table.stats, key);

        if !entries.contains_key(key) {
            return Err(CacheError::NotFound(key.to_string()));
        }
        if ttl.is_zero() {
            entries.remove(key);
            self.table.stats.record_expirations(1);
        } else if let Some(entry) = entries.get_mut(key) {
            entry.expire_in(ttl)?;
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.table
            .read_live(key, |entry| Ok(entry.ttl_remaining()))
            .await?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<String> {
        let found = self
            .table
            .read_live(key, |entry| match &entry.value {
                CacheValue::Map(fields) => fields.get(field).map(codec::to_text).transpose(),
                other => Err(wrong_type(key, "a hash", other)),
            })
            .await?;
        match found {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(CacheError::NotFound(format!("{}.{}", key, field))),
            None => Err(CacheError::NotFound(key.to_string())),
        }
    }

    async fn hset(&self, key: &str, fields: HashMap<String, CacheValue>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut entries = self.table.entries.write().await;
        purge_if_expired(&mut entries, &self.table.stats, key);

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::persistent(CacheValue::Map(BTreeMap::new())));
        match &mut entry.value {
            CacheValue::Map(map) => {
                map.extend(fields);
                Ok(())
            }
            other => Err(wrong_type(key, "a hash", other)),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let found = self
            .table
            .read_live(key, |entry| match &entry.value {
                CacheValue::Map(fields) => fields
                    .iter()
                    .map(|(field, value)| Ok((field.clone(), codec::to_text(value)?)))
                    .collect::<Result<HashMap<_, _>>>(),
                other => Err(wrong_type(key, "a hash", other)),
            })
            .await?;
        Ok(found.unwrap_or_default())
    }

    async fn hdelete(&self, key: &str, fields: &[&str]) -> Result<()> {
        let mut entries = self.table.entries.write().await;
        purge_if_expired(&mut entries, &self.table.stats, key);

        let Some(entry) = entries.get_mut(key) else {
            return Ok(());
        };
        let now_empty = match &mut entry.value {
            CacheValue::Map(map) => {
                for field in fields {
                    map.remove(*field);
                }
                map.is_empty()
            }
            other => return Err(wrong_type(key, "a hash", other)),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn lpush(&self, key: &str, values: Vec<CacheValue>) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut entries = self.table.entries.write().await;
        purge_if_expired(&mut entries, &self.table.stats, key);

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::persistent(CacheValue::List(Vec::new())));
        match &mut entry.value {
            CacheValue::List(list) => {
                // Each value lands at the head in turn, so the last argument ends up first
                list.splice(0..0, values.into_iter().rev());
                Ok(())
            }
            other => Err(wrong_type(key, "a list", other)),
        }
    }

    async fn rpush(&self, key: &str, values: Vec<CacheValue>) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut entries = self.table.entries.write().await;
        purge_if_expired(&mut entries, &self.table.stats, key);

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::persistent(CacheValue::List(Vec::new())));
        match &mut entry.value {
            CacheValue::List(list) => {
                list.extend(values);
                Ok(())
            }
            other => Err(wrong_type(key, "a list", other)),
        }
    }

    async fn lpop(&self, key: &str) -> Result<String> {
        self.pop(key, true).await
    }

    async fn rpop(&self, key: &str) -> Result<String> {
        self.pop(key, false).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let found = self
            .table
            .read_live(key, |entry| match &entry.value {
                CacheValue::List(list) => match clamp_range(list.len(), start, stop) {
                    Some((from, to)) => list[from..=to].iter().map(codec::to_text).collect(),
                    None => Ok(Vec::new()),
                },
                other => Err(wrong_type(key, "a list", other)),
            })
            .await?;
        Ok(found.unwrap_or_default())
    }

    async fn sadd(&self, key: &str, members: Vec<CacheValue>) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let members = texts(&members)?;
        let mut entries = self.table.entries.write().await;
        purge_if_expired(&mut entries, &self.table.stats, key);

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::persistent(CacheValue::Set(BTreeSet::new())));
        match &mut entry.value {
            CacheValue::Set(set) => {
                set.extend(members);
                Ok(())
            }
            other => Err(wrong_type(key, "a set", other)),
        }
    }

    async fn srem(&self, key: &str, members: Vec<CacheValue>) -> Result<()> {
        let members = texts(&members)?;
        let mut entries = self.table.entries.write().await;
        purge_if_expired(&mut entries, &self.table.stats, key);

        let Some(entry) = entries.get_mut(key) else {
            return Ok(());
        };
        let now_empty = match &mut entry.value {
            CacheValue::Set(set) => {
                for member in &members {
                    set.remove(member);
                }
                set.is_empty()
            }
            other => return Err(wrong_type(key, "a set", other)),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let found = self
            .table
            .read_live(key, |entry| match &entry.value {
                CacheValue::Set(set) => Ok(set.iter().cloned().collect()),
                other => Err(wrong_type(key, "a set", other)),
            })
            .await?;
        Ok(found.unwrap_or_default())
    }

    async fn sismember(&self, key: &str, member: CacheValue) -> Result<bool> {
        let member = codec::to_text(&member)?;
        let found = self
            .table
            .read_live(key, |entry| match &entry.value {
                CacheValue::Set(set) => Ok(set.contains(&member)),
                other => Err(wrong_type(key, "a set", other)),
            })
            .await?;
        Ok(found.unwrap_or(false))
    }

    async fn health_check(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        let stats = self.snapshot().await;
        info!(
            "Memory cache healthy: entries={}, hits={}, misses={}, max_memory={} bytes",
            stats.total_entries, stats.hits, stats.misses, self.max_memory
        );
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown.cancel();
        let guard = self.sweeper.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = guard.as_ref() {
            handle.abort();
        }
        info!("Memory cache closed");
        Ok(())
    }

    async fn stats(&self) -> Option<CacheStats> {
        Some(self.snapshot().await)
    }
}

impl MemoryCache {
    async fn pop(&self, key: &str, front: bool) -> Result<String> {
        let mut entries = self.table.entries.write().await;
        purge_if_expired(&mut entries, &self.table.stats, key);

        let Some(entry) = entries.get_mut(key) else {
            return Err(CacheError::NotFound(key.to_string()));
        };
        let (popped, now_empty) = match &mut entry.value {
            CacheValue::List(list) => {
                let popped = if front {
                    (!list.is_empty()).then(|| list.remove(0))
                } else {
                    list.pop()
                };
                (popped, list.is_empty())
            }
            other => return Err(wrong_type(key, "a list", other)),
        };
        if now_empty {
            entries.remove(key);
        }
        match popped {
            Some(value) => codec::to_text(&value),
            None => Err(CacheError::NotFound(key.to_string())),
        }
    }
}
