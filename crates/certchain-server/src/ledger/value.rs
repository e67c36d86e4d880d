//! Contract return values and their plain-JSON form.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A typed contract value as reported by the gateway.
///
/// 128-bit integers arrive as decimal strings and bytes as base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ScValue {
    Void,
    Bool(bool),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    U128(String),
    I128(String),
    Bytes(String),
    String(String),
    Symbol(String),
    Address(String),
    Vec(Vec<ScValue>),
    Map(Vec<ScMapEntry>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScMapEntry {
    pub key: ScValue,
    pub val: ScValue,
}

impl ScValue {
    /// Converts to plain JSON: 64 and 128-bit integers become decimal
    /// strings, bytes become lowercase hex, void becomes null.
    pub fn normalize(&self) -> Value {
        match self {
            ScValue::Void => Value::Null,
            ScValue::Bool(b) => Value::Bool(*b),
            ScValue::U32(n) => Value::from(*n),
            ScValue::I32(n) => Value::from(*n),
            ScValue::U64(n) => Value::String(n.to_string()),
            ScValue::I64(n) => Value::String(n.to_string()),
            ScValue::U128(s) | ScValue::I128(s) => Value::String(s.clone()),
            ScValue::Bytes(b64) => match STANDARD.decode(b64) {
                Ok(raw) => Value::String(hex::encode(raw)),
                Err(_) => Value::String(b64.clone()),
            },
            ScValue::String(s) | ScValue::Symbol(s) | ScValue::Address(s) => {
                Value::String(s.clone())
            }
            ScValue::Vec(items) => Value::Array(items.iter().map(ScValue::normalize).collect()),
            ScValue::Map(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for entry in entries {
                    let key = match entry.key.normalize() {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    map.insert(key, entry.val.normalize());
                }
                Value::Object(map)
            }
        }
    }
}
