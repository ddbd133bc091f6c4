//! JSON bridge for the value tree.

use serde_json::{Map, Number, Value as Json};

use crate::base64;
use crate::error::{ConfluxError, Result};

use super::{Value, ValueType};

impl Value {
    /// Integers become `Int64` (or `Uint64` above `i64::MAX`), reals `Float64`.
    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Uint64(u)
                } else {
                    Value::Float64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Value::String(s.clone()),
            Json::Array(a) => Value::Array(a.iter().map(Value::from_json).collect()),
            Json::Object(o) => Value::Object(
                o.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn from_json_str(s: &str) -> Result<Value> {
        let json: Json = serde_json::from_str(s)?;
        Ok(Value::from_json(&json))
    }

    /// Parse `json` into a value of type `like`, failing instead of widening.
    pub fn from_json_typed(json: &Json, like: ValueType) -> Result<Value> {
        match (like, json) {
            (ValueType::Buf, Json::String(s)) => Ok(Value::Buf(base64::decode(s)?.into())),
            (ValueType::Null | ValueType::Object | ValueType::Array | ValueType::String, _) => {
                let v = Value::from_json(json);
                if like != ValueType::Null && v.value_type() != like {
                    return Err(ConfluxError::InvalidArgument(format!(
                        "expected {}, found {}",
                        like.as_str(),
                        v.type_name()
                    )));
                }
                Ok(v)
            }
            _ => Value::from_json(json).coerce(like),
        }
    }

    /// Bufs serialize as base64 strings; pointers cannot be serialized.
    pub fn to_json(&self) -> Result<Json> {
        Ok(match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int8(v) => Json::from(*v),
            Value::Int16(v) => Json::from(*v),
            Value::Int32(v) => Json::from(*v),
            Value::Int64(v) => Json::from(*v),
            Value::Uint8(v) => Json::from(*v),
            Value::Uint16(v) => Json::from(*v),
            Value::Uint32(v) => Json::from(*v),
            Value::Uint64(v) => Json::from(*v),
            Value::Float32(v) => float(f64::from(*v))?,
            Value::Float64(v) => float(*v)?,
            Value::String(s) => Json::String(s.clone()),
            Value::Buf(b) => Json::String(base64::encode(b.as_slice())),
            Value::Array(a) => Json::Array(a.iter().map(Value::to_json).collect::<Result<_>>()?),
            Value::Object(o) => {
                let mut map = Map::with_capacity(o.len());
                for (k, v) in o {
                    map.insert(k.clone(), v.to_json()?);
                }
                Json::Object(map)
            }
            Value::Ptr(_) => {
                return Err(ConfluxError::InvalidArgument(
                    "pointer values cannot be serialized".into(),
                ))
            }
        })
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(self.to_json()?.to_string())
    }
}

fn float(v: f64) -> Result<Json> {
    Number::from_f64(v)
        .map(Json::Number)
        .ok_or_else(|| ConfluxError::InvalidArgument(format!("{v} has no json representation")))
}
