//! Cache Value Module
//!
//! The tagged variant every engine accepts as input.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::Result;

// == Cache Value ==
/// A value handed to a cache engine.
///
/// The in-process engine stores it as-is; the remote engine runs it through
/// the codec. `List`, `Map` and `Set` double as the in-process representation
/// of list, hash and set keys.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    /// Ordered sequence
    List(Vec<CacheValue>),
    /// Field map
    Map(BTreeMap<String, CacheValue>),
    /// Membership set of text members
    Set(BTreeSet<String>),
    /// Opaque structured value
    Json(serde_json::Value),
}

impl CacheValue {
    /// Wraps any serializable value as an opaque structured value.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(CacheValue::Json(serde_json::to_value(value)?))
    }

    /// Short name of the variant, used in `WrongType` messages.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheValue::Text(_) => "text",
            CacheValue::Int(_) => "integer",
            CacheValue::UInt(_) => "unsigned integer",
            CacheValue::Float(_) => "float",
            CacheValue::Bool(_) => "boolean",
            CacheValue::Bytes(_) => "bytes",
            CacheValue::List(_) => "list",
            CacheValue::Map(_) => "hash",
            CacheValue::Set(_) => "set",
            CacheValue::Json(_) => "json",
        }
    }

    /// Interprets the value as a signed 64-bit integer, if it is one.
    ///
    /// Text and UTF-8 bytes are parsed; floats qualify only when they carry no
    /// fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CacheValue::Int(v) => Some(*v),
            CacheValue::UInt(v) => i64::try_from(*v).ok(),
            CacheValue::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 && *v >= i64::MIN as f64 && *v < i64::MAX as f64
                {
                    Some(*v as i64)
                } else {
                    None
                }
            }
            CacheValue::Text(s) => s.parse().ok(),
            CacheValue::Bytes(b) => std::str::from_utf8(b).ok().and_then(|s| s.parse().ok()),
            _ => None,
        }
    }
}

impl From<String> for CacheValue {
    fn from(v: String) -> Self {
        CacheValue::Text(v)
    }
}

impl From<&str> for CacheValue {
    fn from(v: &str) -> Self {
        CacheValue::Text(v.to_string())
    }
}

impl From<&String> for CacheValue {
    fn from(v: &String) -> Self {
        CacheValue::Text(v.clone())
    }
}

impl From<i64> for CacheValue {
    fn from(v: i64) -> Self {
        CacheValue::Int(v)
    }
}

impl From<i32> for CacheValue {
    fn from(v: i32) -> Self {
        CacheValue::Int(i64::from(v))
    }
}

impl From<u64> for CacheValue {
    fn from(v: u64) -> Self {
        CacheValue::UInt(v)
    }
}

impl From<u32> for CacheValue {
    fn from(v: u32) -> Self {
        CacheValue::UInt(u64::from(v))
    }
}

impl From<f64> for CacheValue {
    fn from(v: f64) -> Self {
        CacheValue::Float(v)
    }
}

impl From<f32> for CacheValue {
    fn from(v: f32) -> Self {
        CacheValue::Float(f64::from(v))
    }
}

impl From<bool> for CacheValue {
    fn from(v: bool) -> Self {
        CacheValue::Bool(v)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(v: Vec<u8>) -> Self {
        CacheValue::Bytes(v)
    }
}

impl From<&[u8]> for CacheValue {
    fn from(v: &[u8]) -> Self {
        CacheValue::Bytes(v.to_vec())
    }
}

impl From<Vec<CacheValue>> for CacheValue {
    fn from(v: Vec<CacheValue>) -> Self {
        CacheValue::List(v)
    }
}

impl From<BTreeMap<String, CacheValue>> for CacheValue {
    fn from(v: BTreeMap<String, CacheValue>) -> Self {
        CacheValue::Map(v)
    }
}

impl From<BTreeSet<String>> for CacheValue {
    fn from(v: BTreeSet<String>) -> Self {
        CacheValue::Set(v)
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(v: serde_json::Value) -> Self {
        CacheValue::Json(v)
    }
}
