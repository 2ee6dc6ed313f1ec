//! Mapping between header values and JSON for the command line.

use bridgerpc_peer::{Headers, Value};
use serde_json::{Map, Number};

/// Render a header value as JSON. Binary values become lowercase hex strings.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::Number((*n).into()),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(bytes) => serde_json::Value::String(hex(bytes)),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect::<Map<_, _>>(),
        ),
    }
}

pub fn headers_to_json(headers: &Headers) -> serde_json::Value {
    serde_json::Value::Object(
        headers
            .iter()
            .map(|(k, v)| (k.clone(), value_to_json(v)))
            .collect(),
    )
}

/// Convert JSON into a header value. Integers outside `i64` become floats.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => Value::Array(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect(),
        ),
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::json;

    use super::*;

    #[test]
    fn json_object_becomes_map() {
        let value = json_to_value(&json!({"test": "data", "n": 3, "ok": true, "list": [1.5, null]}));

        assert_eq!(value.get("test").and_then(Value::as_str), Some("data"));
        assert_eq!(value.get("n").and_then(Value::as_i64), Some(3));
        assert_eq!(value.get("ok"), Some(&Value::Bool(true)));
        assert_eq!(
            value.get("list"),
            Some(&Value::Array(vec![Value::Float(1.5), Value::Null]))
        );
    }

    #[test]
    fn large_unsigned_becomes_float() {
        let value = json_to_value(&json!(u64::MAX));
        assert!(matches!(value, Value::Float(_)));
    }

    #[test]
    fn bytes_render_as_hex() {
        let json = value_to_json(&Value::Bytes(Bytes::from_static(&[0x00, 0xab, 0x10])));
        assert_eq!(json, json!("00ab10"));
    }

    #[test]
    fn headers_render_as_object() {
        let mut headers = Headers::new();
        headers.insert("a".into(), Value::Int(1));
        headers.insert("b".into(), Value::Array(vec!["x".into()]));

        assert_eq!(headers_to_json(&headers), json!({"a": 1, "b": ["x"]}));
    }
}
