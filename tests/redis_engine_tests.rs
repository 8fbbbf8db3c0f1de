//! Integration Tests for the Redis Engine
//!
//! These need a live server. Point `REDIS_URL` (`redis://host:port`) at one,
//! or leave it unset to try localhost:6379. Every test returns early when no
//! server answers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use polycache::{Cache, CacheConfig, CacheDriver, CacheError, RedisCache};

fn redis_address() -> (String, u16) {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let authority = url
        .trim_start_matches("redis://")
        .rsplit('@')
        .next()
        .unwrap_or("")
        .trim_end_matches('/')
        .to_string();
    match authority.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(6379)),
        None => (authority, 6379),
    }
}

fn unique_prefix() -> String {
    format!("polycache-test-{}", uuid::Uuid::new_v4().simple())
}

/// Engine under a unique prefix, or `None` when Redis is unreachable.
async fn connect_or_skip() -> Option<RedisCache> {
    connect_with_prefix(&unique_prefix()).await
}

async fn connect_with_prefix(prefix: &str) -> Option<RedisCache> {
    let (host, port) = redis_address();
    let config = CacheConfig {
        host,
        port,
        prefix: prefix.to_string(),
        dial_timeout: Duration::from_millis(500),
        min_idle_conns: 1,
        pool_size: 4,
        ..CacheConfig::for_driver(CacheDriver::Redis)
    };
    match RedisCache::connect(&config).await {
        Ok(cache) => Some(cache),
        Err(e) => {
            eprintln!("Skipping: Redis not available ({})", e);
            None
        }
    }
}

macro_rules! redis_or_skip {
    () => {
        match connect_or_skip().await {
            Some(cache) => cache,
            None => return,
        }
    };
}

#[tokio::test]
async fn test_scalar_round_trip_and_ttl() {
    let cache = redis_or_skip!();

    cache.set("name", "ada".into(), Duration::ZERO).await.unwrap();
    assert_eq!(cache.get("name").await.unwrap(), "ada");
    assert_eq!(cache.ttl("name").await.unwrap(), None);

    cache.set("session", 42i64.into(), Duration::from_secs(30)).await.unwrap();
    let remaining = cache.ttl("session").await.unwrap().unwrap();
    assert!(remaining <= Duration::from_secs(30));
    assert!(remaining > Duration::from_secs(25));

    cache.delete("name").await.unwrap();
    assert!(matches!(cache.get("name").await, Err(CacheError::NotFound(_))));
    assert!(matches!(cache.ttl("name").await, Err(CacheError::NotFound(_))));
    cache.close().unwrap();
}

#[tokio::test]
async fn test_batch_operations() {
    let cache = redis_or_skip!();

    let pairs: HashMap<String, _> = [("a", 1i64), ("b", 2i64)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into()))
        .collect();
    cache.mset(pairs, Duration::from_secs(60)).await.unwrap();

    let values = cache.mget(&["a", "missing", "b"]).await.unwrap();
    assert_eq!(
        values,
        vec![Some("1".to_string()), None, Some("2".to_string())]
    );
    assert!(cache.ttl("a").await.unwrap().is_some());

    cache.mdelete(&["a", "b"]).await.unwrap();
    assert!(!cache.exists("a").await.unwrap());
    cache.close().unwrap();
}

#[tokio::test]
async fn test_counters_and_type_errors() {
    let cache = redis_or_skip!();

    assert_eq!(cache.increment("hits", 5).await.unwrap(), 5);
    assert_eq!(cache.decrement("hits", 2).await.unwrap(), 3);

    cache.set("text", "abc".into(), Duration::ZERO).await.unwrap();
    assert!(matches!(
        cache.increment("text", 1).await,
        Err(CacheError::NotNumeric(_))
    ));

    cache.rpush("list", vec!["x".into()]).await.unwrap();
    assert!(matches!(
        cache.hget("list", "f").await,
        Err(CacheError::WrongType(_))
    ));
    cache.close().unwrap();
}

#[tokio::test]
async fn test_containers() {
    let cache = redis_or_skip!();

    let fields: HashMap<String, _> = [("name".to_string(), "ada".into()), ("age".to_string(), 36i64.into())]
        .into_iter()
        .collect();
    cache.hset("user", fields).await.unwrap();
    assert_eq!(cache.hget("user", "age").await.unwrap(), "36");
    assert_eq!(cache.hgetall("user").await.unwrap().len(), 2);
    cache.hdelete("user", &["name", "age"]).await.unwrap();
    assert!(!cache.exists("user").await.unwrap());

    cache.rpush("queue", vec!["a".into(), "b".into()]).await.unwrap();
    cache.lpush("queue", vec!["z".into()]).await.unwrap();
    assert_eq!(cache.lrange("queue", 0, -1).await.unwrap(), vec!["z", "a", "b"]);
    assert_eq!(cache.lpop("queue").await.unwrap(), "z");
    assert_eq!(cache.rpop("queue").await.unwrap(), "b");

    cache.sadd("tags", vec!["x".into(), "y".into()]).await.unwrap();
    assert!(cache.sismember("tags", "x".into()).await.unwrap());
    cache.srem("tags", vec!["x".into()]).await.unwrap();
    assert_eq!(cache.smembers("tags").await.unwrap(), vec!["y"]);
    cache.close().unwrap();
}

#[tokio::test]
async fn test_expire_and_health() {
    let cache = redis_or_skip!();

    assert!(matches!(
        cache.expire("absent", Duration::from_secs(1)).await,
        Err(CacheError::NotFound(_))
    ));
    cache.set("k", "v".into(), Duration::ZERO).await.unwrap();
    cache.expire("k", Duration::from_millis(50)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(!cache.exists("k").await.unwrap());

    cache.health_check().await.unwrap();
    let status = cache.pool_status();
    assert!(status.size >= 1);
    assert_eq!(status.max_size, 4);

    cache.close().unwrap();
    cache.close().unwrap();
    assert!(cache.health_check().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_converge() {
    let cache = Arc::new(redis_or_skip!());

    let mut handles = Vec::new();
    for _ in 0..64 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.increment("hits", 1).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.get("hits").await.unwrap(), "64");
    cache.close().unwrap();
}

#[tokio::test]
async fn test_prefix_namespaces_stored_keys() {
    let prefix = unique_prefix();
    let Some(prefixed) = connect_with_prefix(&prefix).await else {
        return;
    };
    let Some(bare) = connect_with_prefix("").await else {
        return;
    };

    prefixed.set("user:1", "ada".into(), Duration::from_secs(60)).await.unwrap();

    let stored_key = format!("{}:user:1", prefix);
    assert_eq!(bare.get(&stored_key).await.unwrap(), "ada");
    assert!(!bare.exists("user:1").await.unwrap());

    bare.delete(&stored_key).await.unwrap();
    assert!(matches!(prefixed.get("user:1").await, Err(CacheError::NotFound(_))));

    prefixed.close().unwrap();
    bare.close().unwrap();
}
