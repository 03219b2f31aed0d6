//! Bridge between [`Value`] and JSON / serde types.
//!
//! Integers map to [`Value::Integer`], every other number to
//! [`Value::Double`]. Integers beyond the `i64` range are rejected rather
//! than rounded. Object key order is kept. `null` is [`Value::Void`] at
//! the top level; a `null` struct member is treated as absent.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value as Json};

use crate::error::{CodecError, Result};
use crate::value::Value;

impl Value {
    /// Convert a JSON document into a top-level value.
    pub fn from_json(json: &Json) -> Result<Value> {
        match json {
            Json::Null => Ok(Value::Void),
            other => member_from_json(other),
        }
    }

    /// Convert into JSON. Errors become `{"code": .., "message": ..}`.
    pub fn to_json(&self) -> Result<Json> {
        Ok(match self {
            Value::String(s) => Json::String(s.clone()),
            Value::Integer(i) => Json::Number((*i).into()),
            Value::Double(d) => Number::from_f64(*d)
                .map(Json::Number)
                .ok_or_else(|| CodecError::Unrepresentable(format!("non-finite double {d}")))?,
            Value::Bool(b) => Json::Bool(*b),
            Value::List(items) => Json::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Struct(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for (name, value) in fields {
                    map.insert(name.clone(), value.to_json()?);
                }
                Json::Object(map)
            }
            Value::Void => Json::Null,
            Value::Error { code, message } => {
                let mut map = Map::with_capacity(2);
                map.insert("code".to_string(), Json::Number((*code).into()));
                map.insert("message".to_string(), Json::String(message.clone()));
                Json::Object(map)
            }
        })
    }
}

fn member_from_json(json: &Json) -> Result<Value> {
    Ok(match json {
        Json::Null => {
            return Err(CodecError::Unrepresentable(
                "null inside a list".to_string(),
            ))
        }
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None if n.is_u64() => {
                return Err(CodecError::Unrepresentable(format!(
                    "integer {n} is out of the signed 64-bit range"
                )))
            }
            None => Value::Double(n.as_f64().ok_or_else(|| {
                CodecError::Unrepresentable(format!("number {n}"))
            })?),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List(
            items
                .iter()
                .map(member_from_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Json::Object(map) => Value::Struct(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| Ok((k.clone(), member_from_json(v)?)))
                .collect::<Result<Vec<_>>>()?,
        ),
    })
}

/// Serialize any serde type into a value.
pub fn to_value<T: Serialize + ?Sized>(data: &T) -> Result<Value> {
    Value::from_json(&serde_json::to_value(data)?)
}

/// Project a value into any serde type.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    Ok(serde_json::from_value(value.to_json()?)?)
}
