//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::time::Duration;

use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for GET /get/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    /// Text form of the stored value
    pub value: String,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Response body for PUT /set
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    pub message: String,
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /del/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for GET /ttl/:key
#[derive(Debug, Clone, Serialize)]
pub struct TtlResponse {
    pub key: String,
    /// Remaining lifetime in milliseconds; null when the key never expires
    pub ttl_ms: Option<u64>,
}

impl TtlResponse {
    pub fn new(key: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            key: key.into(),
            ttl_ms: ttl.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

/// Response body for POST /incr/:key
#[derive(Debug, Clone, Serialize)]
pub struct IncrResponse {
    pub key: String,
    pub value: i64,
}

/// Response body for GET /stats
///
/// Engines that keep no statistics report `available: false` with zeroed
/// counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub driver: String,
    pub available: bool,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(driver: impl Into<String>, stats: Option<CacheStats>) -> Self {
        let available = stats.is_some();
        let stats = stats.unwrap_or_default();
        Self {
            driver: driver.into(),
            available,
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            expirations: stats.expirations,
            total_entries: stats.total_entries,
        }
    }
}

/// Response body for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: String,
    pub driver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy(driver: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            driver: driver.into(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn unhealthy(driver: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            driver: driver.into(),
            error: Some(error.into()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
