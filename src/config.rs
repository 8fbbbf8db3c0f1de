//! Configuration Module
//!
//! Declarative tunables for the cache engines and the demo server. Values can
//! be deserialized (durations in humantime form, e.g. `"5s"`) or loaded from
//! environment variables; either way `CacheConfig::set_defaults` runs before
//! an engine is constructed.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

// == Defaults ==
pub const DEFAULT_DRIVER: &str = "redis";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MIN_RETRY_BACKOFF: Duration = Duration::from_millis(8);
pub const DEFAULT_MAX_RETRY_BACKOFF: Duration = Duration::from_millis(512);
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_MIN_IDLE_CONNS: usize = 5;
pub const DEFAULT_POOL_TIMEOUT: Duration = Duration::from_secs(4);
pub const DEFAULT_MAX_CONN_AGE: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_IDLE_CHECK_FREQ: Duration = Duration::from_secs(60);
/// 100 MiB
pub const DEFAULT_MAX_MEMORY: u64 = 100 * 1024 * 1024;
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

// == Cache Driver ==
/// The closed set of recognized engine names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDriver {
    /// Remote key-value store (Redis protocol)
    Redis,
    /// In-process table
    Memory,
}

impl CacheDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheDriver::Redis => "redis",
            CacheDriver::Memory => "memory",
        }
    }
}

impl fmt::Display for CacheDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheDriver {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.eq_ignore_ascii_case("redis") {
            Ok(CacheDriver::Redis)
        } else if name.eq_ignore_ascii_case("memory") {
            Ok(CacheDriver::Memory)
        } else {
            Err(CacheError::UnsupportedDriver(s.to_string()))
        }
    }
}

// == Cache Config ==
/// Cache engine configuration.
///
/// Remote-only fields are ignored by the in-process engine and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Engine name: `redis` or `memory`
    pub driver: String,

    /// Remote store host
    pub host: String,
    /// Remote store port
    pub port: u16,
    /// Remote store password, empty = no auth
    pub password: String,
    /// Remote store database index
    pub database: i64,
    /// Key prefix applied by the remote engine, empty = none
    pub prefix: String,

    /// Connection acquisition retries after the first attempt
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub min_retry_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_retry_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub dial_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    /// Maximum number of pooled connections
    pub pool_size: usize,
    /// Connections opened eagerly at construction
    pub min_idle_conns: usize,
    /// How long a caller waits for a free pooled connection
    #[serde(with = "humantime_serde")]
    pub pool_timeout: Duration,
    /// Pooled connections older than this are closed by the idle reaper
    #[serde(with = "humantime_serde")]
    pub max_conn_age: Duration,
    /// Pooled connections unused for this long are closed by the idle reaper
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// How often the idle reaper runs
    #[serde(with = "humantime_serde")]
    pub idle_check_freq: Duration,

    /// Advisory memory ceiling in bytes (in-process engine)
    pub max_memory: u64,
    /// Sweep cadence of the in-process engine
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: DEFAULT_DRIVER.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            password: String::new(),
            database: 0,
            prefix: String::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            min_retry_backoff: DEFAULT_MIN_RETRY_BACKOFF,
            max_retry_backoff: DEFAULT_MAX_RETRY_BACKOFF,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            pool_size: DEFAULT_POOL_SIZE,
            min_idle_conns: DEFAULT_MIN_IDLE_CONNS,
            pool_timeout: DEFAULT_POOL_TIMEOUT,
            max_conn_age: DEFAULT_MAX_CONN_AGE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            idle_check_freq: DEFAULT_IDLE_CHECK_FREQ,
            max_memory: DEFAULT_MAX_MEMORY,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// A config for the given driver with every other field defaulted.
    pub fn for_driver(driver: CacheDriver) -> Self {
        Self {
            driver: driver.to_string(),
            ..Self::default()
        }
    }

    /// Loads configuration from `CACHE_*` environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DRIVER`, `CACHE_HOST`, `CACHE_PORT`, `CACHE_PASSWORD`,
    ///   `CACHE_DATABASE`, `CACHE_PREFIX`
    /// - `CACHE_MAX_RETRIES`, `CACHE_MIN_RETRY_BACKOFF`, `CACHE_MAX_RETRY_BACKOFF`
    /// - `CACHE_DIAL_TIMEOUT`, `CACHE_READ_TIMEOUT`, `CACHE_WRITE_TIMEOUT`
    /// - `CACHE_POOL_SIZE`, `CACHE_MIN_IDLE_CONNS`, `CACHE_POOL_TIMEOUT`
    /// - `CACHE_MAX_CONN_AGE`, `CACHE_IDLE_TIMEOUT`, `CACHE_IDLE_CHECK_FREQ`
    /// - `CACHE_MAX_MEMORY`, `CACHE_CLEANUP_INTERVAL`
    ///
    /// Durations use humantime syntax (`"500ms"`, `"10m"`). Unset or
    /// unparseable variables fall back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut config = Self {
            driver: env::var("CACHE_DRIVER").unwrap_or(defaults.driver),
            host: env::var("CACHE_HOST").unwrap_or(defaults.host),
            port: env_parse("CACHE_PORT").unwrap_or(defaults.port),
            password: env::var("CACHE_PASSWORD").unwrap_or_default(),
            database: env_parse("CACHE_DATABASE").unwrap_or(defaults.database),
            prefix: env::var("CACHE_PREFIX").unwrap_or_default(),
            max_retries: env_parse("CACHE_MAX_RETRIES").unwrap_or(defaults.max_retries),
            min_retry_backoff: env_duration("CACHE_MIN_RETRY_BACKOFF")
                .unwrap_or(defaults.min_retry_backoff),
            max_retry_backoff: env_duration("CACHE_MAX_RETRY_BACKOFF")
                .unwrap_or(defaults.max_retry_backoff),
            dial_timeout: env_duration("CACHE_DIAL_TIMEOUT").unwrap_or(defaults.dial_timeout),
            read_timeout: env_duration("CACHE_READ_TIMEOUT").unwrap_or(defaults.read_timeout),
            write_timeout: env_duration("CACHE_WRITE_TIMEOUT").unwrap_or(defaults.write_timeout),
            pool_size: env_parse("CACHE_POOL_SIZE").unwrap_or(defaults.pool_size),
            min_idle_conns: env_parse("CACHE_MIN_IDLE_CONNS").unwrap_or(defaults.min_idle_conns),
            pool_timeout: env_duration("CACHE_POOL_TIMEOUT").unwrap_or(defaults.pool_timeout),
            max_conn_age: env_duration("CACHE_MAX_CONN_AGE").unwrap_or(defaults.max_conn_age),
            idle_timeout: env_duration("CACHE_IDLE_TIMEOUT").unwrap_or(defaults.idle_timeout),
            idle_check_freq: env_duration("CACHE_IDLE_CHECK_FREQ")
                .unwrap_or(defaults.idle_check_freq),
            max_memory: env_parse("CACHE_MAX_MEMORY").unwrap_or(defaults.max_memory),
            cleanup_interval: env_duration("CACHE_CLEANUP_INTERVAL")
                .unwrap_or(defaults.cleanup_interval),
        };
        config.set_defaults();
        config
    }

    // == Set Defaults ==
    /// Replaces zero or empty fields with their defaults.
    ///
    /// Already-set values are never touched, so calling this twice is the
    /// same as calling it once. `database` and `prefix` are legitimately
    /// zero/empty and are left alone.
    pub fn set_defaults(&mut self) {
        if self.driver.trim().is_empty() {
            self.driver = DEFAULT_DRIVER.to_string();
        }
        if self.host.is_empty() {
            self.host = DEFAULT_HOST.to_string();
        }
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.max_retries == 0 {
            self.max_retries = DEFAULT_MAX_RETRIES;
        }
        default_duration(&mut self.min_retry_backoff, DEFAULT_MIN_RETRY_BACKOFF);
        default_duration(&mut self.max_retry_backoff, DEFAULT_MAX_RETRY_BACKOFF);
        default_duration(&mut self.dial_timeout, DEFAULT_DIAL_TIMEOUT);
        default_duration(&mut self.read_timeout, DEFAULT_READ_TIMEOUT);
        default_duration(&mut self.write_timeout, DEFAULT_WRITE_TIMEOUT);
        if self.pool_size == 0 {
            self.pool_size = DEFAULT_POOL_SIZE;
        }
        if self.min_idle_conns == 0 {
            self.min_idle_conns = DEFAULT_MIN_IDLE_CONNS;
        }
        default_duration(&mut self.pool_timeout, DEFAULT_POOL_TIMEOUT);
        default_duration(&mut self.max_conn_age, DEFAULT_MAX_CONN_AGE);
        default_duration(&mut self.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        default_duration(&mut self.idle_check_freq, DEFAULT_IDLE_CHECK_FREQ);
        if self.max_memory == 0 {
            self.max_memory = DEFAULT_MAX_MEMORY;
        }
        default_duration(&mut self.cleanup_interval, DEFAULT_CLEANUP_INTERVAL);
    }

    /// Parses the driver name.
    pub fn driver(&self) -> Result<CacheDriver, CacheError> {
        self.driver.parse()
    }

    /// `host:port` of the remote store.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_duration(field: &mut Duration, default: Duration) {
    if field.is_zero() {
        *field = default;
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_duration(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| humantime::parse_duration(v.trim()).ok())
}

// == Server Config ==
/// Settings for the demo HTTP server binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Cache engine settings
    pub cache: CacheConfig,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// `SERVER_PORT` (default: 3000) plus everything `CacheConfig::from_env` reads.
    pub fn from_env() -> Self {
        Self {
            server_port: env_parse("SERVER_PORT").unwrap_or(3000),
            cache: CacheConfig::from_env(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache: CacheConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.driver, "redis");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6379);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.min_idle_conns, 5);
        assert_eq!(config.max_memory, 100 * 1024 * 1024);
        assert_eq!(config.cleanup_interval, Duration::from_secs(600));
        assert_eq!(config.max_conn_age, Duration::from_secs(3600));
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.idle_check_freq, Duration::from_secs(60));
    }

    #[test]
    fn test_set_defaults_fills_zero_fields() {
        let mut config = CacheConfig {
            driver: String::new(),
            host: String::new(),
            port: 0,
            password: String::new(),
            database: 0,
            prefix: String::new(),
            max_retries: 0,
            min_retry_backoff: Duration::ZERO,
            max_retry_backoff: Duration::ZERO,
            dial_timeout: Duration::ZERO,
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            pool_size: 0,
            min_idle_conns: 0,
            pool_timeout: Duration::ZERO,
            max_conn_age: Duration::ZERO,
            idle_timeout: Duration::ZERO,
            idle_check_freq: Duration::ZERO,
            max_memory: 0,
            cleanup_interval: Duration::ZERO,
        };
        config.set_defaults();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_set_defaults_is_idempotent() {
        let mut config = CacheConfig {
            driver: "memory".to_string(),
            port: 7000,
            prefix: "app".to_string(),
            read_timeout: Duration::from_millis(250),
            pool_size: 32,
            ..CacheConfig::default()
        };
        config.set_defaults();
        let once = config.clone();
        config.set_defaults();
        assert_eq!(config, once);
        assert_eq!(config.port, 7000);
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.prefix, "app");
    }

    #[test]
    fn test_driver_parsing() {
        assert_eq!("redis".parse::<CacheDriver>().unwrap(), CacheDriver::Redis);
        assert_eq!(" Memory ".parse::<CacheDriver>().unwrap(), CacheDriver::Memory);
        assert!(matches!(
            "memcached".parse::<CacheDriver>(),
            Err(CacheError::UnsupportedDriver(_))
        ));
    }

    #[test]
    fn test_deserialize_humantime_durations() {
        let json = r#"{"driver":"memory","cleanup_interval":"250ms","read_timeout":"2s"}"#;
        let config: CacheConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.driver, "memory");
        assert_eq!(config.cleanup_interval, Duration::from_millis(250));
        assert_eq!(config.read_timeout, Duration::from_secs(2));
        // Missing fields take defaults
        assert_eq!(config.port, 6379);
    }

    #[test]
    fn test_address() {
        let config = CacheConfig {
            host: "cache.internal".to_string(),
            port: 6380,
            ..CacheConfig::default()
        };
        assert_eq!(config.address(), "cache.internal:6380");
    }

    #[test]
    fn test_server_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cache.driver, "redis");
    }
}
