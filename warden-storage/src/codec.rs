//! Value encoding.
//!
//! Strings are stored raw so other clients reading the store see plain
//! text; every other JSON value is stored as its JSON text. Reads parse JSON
//! first and fall back to the raw string, so a stored `"42"` string comes
//! back as the number `42`. Callers needing the exact text use
//! [`KeyValueStore::get_raw`](crate::KeyValueStore::get_raw); callers that
//! need every value back with its type use
//! [`KeyValueStore::set_json`](crate::KeyValueStore::set_json) and
//! [`KeyValueStore::get_json`](crate::KeyValueStore::get_json).

use serde::Serialize;
use serde_json::Value;
use warden_core::StoreResult;

/// Encode a serializable value for storage.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> StoreResult<String> {
    match serde_json::to_value(value)? {
        Value::String(s) => Ok(s),
        other => Ok(serde_json::to_string(&other)?),
    }
}

/// Decode a stored payload.
pub fn decode(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strings_stored_raw() {
        assert_eq!(encode("hello").expect("encode"), "hello");
        assert_eq!(encode(&"a \"quoted\" word".to_string()).expect("encode"), "a \"quoted\" word");
    }

    #[test]
    fn test_structured_values_stored_as_json() {
        let v = json!({"customer_id": "TEST001", "churn_probability": 0.8});
        let encoded = encode(&v).expect("encode");
        assert_eq!(decode(&encoded), v);
        assert_eq!(encode(&7).expect("encode"), "7");
        assert_eq!(encode(&Option::<u8>::None).expect("encode"), "null");
    }

    #[test]
    fn test_decode_falls_back_to_string() {
        assert_eq!(decode("plain text"), Value::String("plain text".into()));
        assert_eq!(decode("{broken"), Value::String("{broken".into()));
        assert_eq!(decode("42"), json!(42));
        assert_eq!(decode("true"), json!(true));
    }
}
