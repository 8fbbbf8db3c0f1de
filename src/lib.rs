//! polycache - a pluggable key-value cache
//!
//! One async `Cache` facade with two engines: an in-process table with TTL
//! expiry and a background sweep, and a Redis-backed adapter. The factory
//! picks the engine from `CacheConfig::driver`.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod tasks;

pub use cache::{create_cache, Cache, CacheFactory, CacheValue, MemoryCache, RedisCache};
pub use config::{CacheConfig, CacheDriver, Config};
pub use error::{CacheError, Result};
pub use session::TokenRegistry;
