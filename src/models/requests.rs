//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::CacheValue;

const MAX_KEY_LENGTH: usize = 256;

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value; scalars are stored as scalars, the rest as JSON
/// - `ttl`: Optional TTL in seconds (absent or 0 means no expiry)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }

    /// The value in cache form.
    pub fn cache_value(&self) -> CacheValue {
        match &self.value {
            Value::String(s) => CacheValue::Text(s.clone()),
            Value::Bool(b) => CacheValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    CacheValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    CacheValue::UInt(u)
                } else {
                    CacheValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            other => CacheValue::Json(other.clone()),
        }
    }
}

/// Request body for POST /incr/:key
#[derive(Debug, Clone, Deserialize)]
pub struct IncrRequest {
    #[serde(default = "default_delta")]
    pub delta: i64,
}

impl Default for IncrRequest {
    fn default() -> Self {
        Self {
            delta: default_delta(),
        }
    }
}

fn default_delta() -> i64 {
    1
}

pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        ));
    }
    None
}
