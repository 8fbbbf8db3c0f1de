//! Engine Selector
//!
//! Builds the engine named by `CacheConfig::driver` behind the `Cache` facade.

use std::sync::Arc;

use tracing::info;

use crate::cache::{Cache, MemoryCache, RedisCache};
use crate::config::{CacheConfig, CacheDriver};
use crate::error::Result;

/// Creates the configured engine. Defaults are applied first, so an empty
/// driver selects Redis.
pub async fn create_cache(mut config: CacheConfig) -> Result<Arc<dyn Cache>> {
    config.set_defaults();
    let driver = config.driver()?;
    info!("Creating {} cache engine", driver);

    let cache: Arc<dyn Cache> = match driver {
        CacheDriver::Redis => Arc::new(RedisCache::connect(&config).await?),
        CacheDriver::Memory => Arc::new(MemoryCache::new(&config)?),
    };
    Ok(cache)
}

/// Shorthand constructors for the common engine setups.
pub struct CacheFactory;

impl CacheFactory {
    /// Redis engine with default pool and timeout settings.
    pub async fn create_redis_cache(
        host: &str,
        port: u16,
        password: &str,
        database: i64,
    ) -> Result<Arc<dyn Cache>> {
        let config = CacheConfig {
            host: host.to_string(),
            port,
            password: password.to_string(),
            database,
            ..CacheConfig::for_driver(CacheDriver::Redis)
        };
        create_cache(config).await
    }

    /// In-process engine with the default sweep interval.
    pub async fn create_memory_cache() -> Result<Arc<dyn Cache>> {
        create_cache(CacheConfig::for_driver(CacheDriver::Memory)).await
    }
}
