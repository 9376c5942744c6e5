//! Conversion between column values and SQLite values.
//!
//! Column values are `serde_json::Value`. Arrays and objects are stored as JSON
//! text; on read, only columns declared as encoded are parsed back.

use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};

pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => number_to_sql(n),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn number_to_sql(n: &Number) -> SqlValue {
    if let Some(i) = n.as_i64() {
        SqlValue::Integer(i)
    } else {
        SqlValue::Real(n.as_f64().unwrap_or_default())
    }
}

pub(crate) fn from_sql(value: ValueRef<'_>, decode: bool) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            if decode {
                decode_text(&text)
            } else {
                Value::String(text.into_owned())
            }
        }
        ValueRef::Blob(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn decode_text(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "encoded column holds non-JSON text, keeping raw");
            Value::String(text.to_string())
        }
    }
}
