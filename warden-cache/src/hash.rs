//! Input hashing for cache keys.
//!
//! Two payloads that are equal as JSON hash identically regardless of the
//! order their object fields were written in. Object keys are sorted while
//! serializing, independent of how `serde_json::Map` is configured.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use warden_core::StoreResult;

/// Hex SHA-256 of the canonical JSON form of `input`.
pub fn input_hash<T: Serialize + ?Sized>(input: &T) -> StoreResult<String> {
    let value = serde_json::to_value(input)?;
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// Compact JSON with object keys in sorted order.
pub fn canonical_json(value: &Value) -> StoreResult<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> StoreResult<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_field_order_does_not_matter() {
        let a: Value = serde_json::from_str(
            r#"{"tenure": 12, "contract": "monthly", "charges": {"b": 2, "a": 1}}"#,
        )
        .expect("valid json");
        let b: Value = serde_json::from_str(
            r#"{"charges": {"a": 1, "b": 2}, "contract": "monthly", "tenure": 12}"#,
        )
        .expect("valid json");
        assert_eq!(
            input_hash(&a).expect("hash"),
            input_hash(&b).expect("hash")
        );
    }

    #[test]
    fn test_different_inputs_differ() {
        let a = input_hash(&json!({"test": "data"})).expect("hash");
        let b = input_hash(&json!({"test": "other"})).expect("hash");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_canonical_form() {
        let v = json!({"b": [1, {"z": null, "y": true}], "a": "x"});
        assert_eq!(
            canonical_json(&v).expect("canonical"),
            r#"{"a":"x","b":[1,{"y":true,"z":null}]}"#
        );
    }

    #[test]
    fn test_structs_hash_like_their_json() {
        #[derive(Serialize)]
        struct Input {
            tenure: u32,
            contract: &'static str,
        }
        let from_struct = input_hash(&Input {
            tenure: 3,
            contract: "yearly",
        })
        .expect("hash");
        let mut map = BTreeMap::new();
        map.insert("contract", json!("yearly"));
        map.insert("tenure", json!(3));
        assert_eq!(from_struct, input_hash(&map).expect("hash"));
    }

    #[test]
    fn test_unserializable_input_is_error() {
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1);
        assert!(input_hash(&bad).is_err());
    }
}
