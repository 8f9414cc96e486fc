//! Firestore typed-value codec.
//!
//! The REST API wraps every field in a single-key object naming its type
//! (`{"stringValue": "x"}`, `{"integerValue": "42"}`, ...). Documents are
//! handled as plain JSON everywhere else in the crate, so values are unwrapped
//! on the way in and wrapped on the way out.
use serde_json::{json, Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("expected a typed value object, got {0}")]
    NotAnObject(String),
    #[error("unsupported value type: {0}")]
    UnknownType(String),
    #[error("invalid integer value: {0}")]
    InvalidInteger(String),
    #[error("malformed {0}")]
    Malformed(&'static str),
}

/// Unwrap a Firestore `fields` map into a plain JSON object.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, DecodeError> {
    fields
        .iter()
        .map(|(name, value)| Ok((name.clone(), decode_value(value)?)))
        .collect()
}

/// Unwrap one typed value.
///
/// Timestamps and references decode to their string form, geo points to a
/// `{latitude, longitude}` object, bytes to their base64 string.
pub fn decode_value(value: &Value) -> Result<Value, DecodeError> {
    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::NotAnObject(value.to_string()))?;
    let (kind, inner) = object
        .iter()
        .next()
        .ok_or(DecodeError::Malformed("empty value object"))?;

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or(DecodeError::Malformed("booleanValue")),
        "integerValue" => decode_integer(inner),
        "doubleValue" => match inner {
            Value::Number(n) => Ok(Value::Number(n.clone())),
            // NaN and the infinities arrive as strings and have no JSON form.
            Value::String(_) => Ok(Value::Null),
            _ => Err(DecodeError::Malformed("doubleValue")),
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or(DecodeError::Malformed("string-like value")),
        "geoPointValue" => Ok(json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(json!(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(json!(0.0)),
        })),
        "arrayValue" => {
            let values: &[Value] = match inner.get("values") {
                Some(Value::Array(values)) => values.as_slice(),
                Some(_) => return Err(DecodeError::Malformed("arrayValue")),
                None => &[],
            };
            values
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "mapValue" => match inner.get("fields") {
            Some(Value::Object(fields)) => decode_fields(fields).map(Value::Object),
            Some(_) => Err(DecodeError::Malformed("mapValue")),
            None => Ok(Value::Object(Map::new())),
        },
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}

fn decode_integer(inner: &Value) -> Result<Value, DecodeError> {
    match inner {
        // int64 travels as a decimal string to survive JSON number precision.
        Value::String(s) => s
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| DecodeError::InvalidInteger(s.clone())),
        Value::Number(n) if n.is_i64() => Ok(Value::Number(n.clone())),
        other => Err(DecodeError::InvalidInteger(other.to_string())),
    }
}

/// Wrap a plain JSON value as a Firestore typed value.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => encode_number(n),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(values) => {
            let values: Vec<Value> = values.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(fields) => {
            let fields: Map<String, Value> = fields
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

fn encode_number(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        json!({ "integerValue": i.to_string() })
    } else {
        json!({ "doubleValue": n.as_f64().unwrap_or(0.0) })
    }
}
