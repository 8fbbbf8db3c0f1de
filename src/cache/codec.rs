//! Value Codec
//!
//! Converts `CacheValue`s into the text/byte form stored by the remote engine
//! and returned by scalar reads on either engine.
//!
//! - Text and bytes pass through unchanged.
//! - Integers, unsigned integers and floats become decimal text.
//! - Booleans become `"true"` / `"false"`.
//! - Lists, maps, sets and opaque values become JSON text.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use crate::cache::CacheValue;
use crate::error::{CacheError, Result};

// == Encode ==
/// Encodes a value into the bytes sent to the remote store.
pub fn encode(value: &CacheValue) -> Result<Vec<u8>> {
    match value {
        CacheValue::Bytes(bytes) => Ok(bytes.clone()),
        other => to_text(other).map(String::into_bytes),
    }
}

// == Text Form ==
/// The text form of a value, as returned by `get` and friends.
///
/// Bytes that are not valid UTF-8 are converted lossily.
pub fn to_text(value: &CacheValue) -> Result<String> {
    match value {
        CacheValue::Text(s) => Ok(s.clone()),
        CacheValue::Int(v) => Ok(v.to_string()),
        CacheValue::UInt(v) => Ok(v.to_string()),
        CacheValue::Float(v) => Ok(v.to_string()),
        CacheValue::Bool(v) => Ok(v.to_string()),
        CacheValue::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
        structured => Ok(serde_json::to_string(&to_json(structured)?)?),
    }
}

/// Builds the JSON tree for a value.
///
/// Sets are emitted as arrays in member order; bytes become a string when
/// they are UTF-8 and an array of numbers otherwise.
pub fn to_json(value: &CacheValue) -> Result<Value> {
    Ok(match value {
        CacheValue::Text(s) => Value::String(s.clone()),
        CacheValue::Int(v) => Value::from(*v),
        CacheValue::UInt(v) => Value::from(*v),
        CacheValue::Float(v) => Number::from_f64(*v).map(Value::Number).ok_or_else(|| {
            CacheError::Serialization(format!("float {} has no JSON representation", v))
        })?,
        CacheValue::Bool(v) => Value::Bool(*v),
        CacheValue::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
        },
        CacheValue::List(items) => {
            Value::Array(items.iter().map(to_json).collect::<Result<Vec<_>>>()?)
        }
        CacheValue::Map(fields) => {
            let mut object = Map::with_capacity(fields.len());
            for (field, v) in fields {
                object.insert(field.clone(), to_json(v)?);
            }
            Value::Object(object)
        }
        CacheValue::Set(members) => {
            Value::Array(members.iter().cloned().map(Value::String).collect())
        }
        CacheValue::Json(v) => v.clone(),
    })
}

// == Decode ==
/// Decodes JSON text produced for a structured value.
pub fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}

/// Parses the decimal text form of an integer.
pub fn decode_int(text: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|_| CacheError::NotNumeric(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::{BTreeMap, BTreeSet};

    #[test]
    fn test_scalars_encode_as_text() {
        assert_eq!(encode(&"hello".into()).unwrap(), b"hello");
        assert_eq!(encode(&CacheValue::Int(-12)).unwrap(), b"-12");
        assert_eq!(encode(&CacheValue::UInt(u64::MAX)).unwrap(), b"18446744073709551615");
        assert_eq!(encode(&CacheValue::Float(1.5)).unwrap(), b"1.5");
        assert_eq!(encode(&CacheValue::Bool(false)).unwrap(), b"false");
    }

    #[test]
    fn test_bytes_pass_through() {
        let raw = vec![0xff, 0x00, 0x10];
        assert_eq!(encode(&CacheValue::Bytes(raw.clone())).unwrap(), raw);
        assert_eq!(to_text(&CacheValue::Bytes(b"abc".to_vec())).unwrap(), "abc");
    }

    #[test]
    fn test_structured_values_become_json() {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), CacheValue::from("ada"));
        fields.insert("age".to_string(), CacheValue::Int(36));
        assert_eq!(
            to_text(&CacheValue::Map(fields)).unwrap(),
            r#"{"age":36,"name":"ada"}"#
        );

        let list = CacheValue::List(vec![CacheValue::Int(1), "two".into(), CacheValue::Bool(true)]);
        assert_eq!(to_text(&list).unwrap(), r#"[1,"two",true]"#);

        let set: BTreeSet<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(to_text(&CacheValue::Set(set)).unwrap(), r#"["a","b"]"#);

        let opaque = CacheValue::Json(json!({"roles": ["admin"]}));
        assert_eq!(to_text(&opaque).unwrap(), r#"{"roles":["admin"]}"#);
    }

    #[test]
    fn test_non_finite_float_inside_structure_fails() {
        let list = CacheValue::List(vec![CacheValue::Float(f64::NAN)]);
        assert!(matches!(to_text(&list), Err(CacheError::Serialization(_))));
        // As a bare scalar it still has a text form
        assert_eq!(to_text(&CacheValue::Float(f64::INFINITY)).unwrap(), "inf");
    }

    #[test]
    fn test_non_utf8_bytes_in_structure_become_numbers() {
        let list = CacheValue::List(vec![CacheValue::Bytes(vec![0xff, 1])]);
        assert_eq!(to_text(&list).unwrap(), "[[255,1]]");
    }

    #[test]
    fn test_decode_json_and_int() {
        let roles: Vec<String> = decode_json(r#"["admin","ops"]"#).unwrap();
        assert_eq!(roles, vec!["admin", "ops"]);
        assert!(matches!(
            decode_json::<Vec<String>>("not json"),
            Err(CacheError::Serialization(_))
        ));
        assert_eq!(decode_int(" 17 ").unwrap(), 17);
        assert!(matches!(decode_int("1.5"), Err(CacheError::NotNumeric(_))));
    }

    proptest! {
        #[test]
        fn prop_integer_text_parses_back(n in any::<i64>()) {
            let text = to_text(&CacheValue::Int(n)).unwrap();
            prop_assert_eq!(decode_int(&text).unwrap(), n);
        }

        #[test]
        fn prop_text_is_unchanged(s in "\\PC{0,64}") {
            prop_assert_eq!(encode(&CacheValue::Text(s.clone())).unwrap(), s.into_bytes());
        }
    }
}
