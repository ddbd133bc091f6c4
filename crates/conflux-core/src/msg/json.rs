//! JSON form of messages, produced and consumed through the field tables.
//!
//! User properties sit at the document root; internal fields live under the
//! reserved [`INTERNAL_NS`] object:
//!
//! ```json
//! { "_conflux": { "type": "cmd", "name": "hello", "cmd_id": "..." }, "greeting": "hi" }
//! ```

use serde_json::{Map, Value as Json};

use crate::error::{ConfluxError, Result};
use crate::value::Value;

use super::field::{self, FieldData, FieldId, FieldVisitor, INTERNAL_NS};
use super::{Msg, MsgType};

struct JsonWriter {
    root: Map<String, Json>,
    internal: Map<String, Json>,
}

impl FieldVisitor for JsonWriter {
    fn visit(&mut self, _msg_type: MsgType, field: &mut FieldData) -> Result<()> {
        if field.user_defined {
            for (k, v) in field.value.as_object()? {
                self.root.insert(k.clone(), v.to_json()?);
            }
            return Ok(());
        }
        if field.value.is_null() {
            return Ok(());
        }
        let json = field
            .value
            .to_json()
            .map_err(|e| ConfluxError::field(field.name, e.to_string()))?;
        self.internal.insert(field.name.to_owned(), json);
        Ok(())
    }
}

pub fn to_json<M: Msg>(msg: &M) -> Result<Json> {
    let mut w = JsonWriter {
        root: Map::new(),
        internal: Map::new(),
    };
    field::inspect_fields(msg, &mut w)?;
    w.root.insert(INTERNAL_NS.to_owned(), Json::Object(w.internal));
    Ok(Json::Object(w.root))
}

struct JsonReader<'a> {
    root: &'a Map<String, Json>,
    internal: Option<&'a Map<String, Json>>,
}

impl FieldVisitor for JsonReader<'_> {
    fn visit(&mut self, msg_type: MsgType, field: &mut FieldData) -> Result<()> {
        if field.user_defined {
            let mut props = Value::object();
            for (k, v) in self.root.iter().filter(|(k, _)| *k != INTERNAL_NS) {
                props.insert(k.clone(), Value::from_json(v))?;
            }
            field.value.merge_from(props);
            field.mark_changed();
            return Ok(());
        }

        let Some(json) = self.internal.and_then(|m| m.get(field.name)) else {
            return Ok(());
        };
        if field.id == FieldId::Type {
            return match json.as_str() {
                Some(t) if t == msg_type.as_str() => Ok(()),
                _ => Err(ConfluxError::field(
                    "type",
                    format!("expected `{msg_type}`, found {json}"),
                )),
            };
        }
        let v = Value::from_json_typed(json, field.value.value_type())
            .map_err(|e| ConfluxError::field(field.name, e.to_string()))?;
        field.replace(v);
        Ok(())
    }
}

fn reader(json: &Json) -> Result<JsonReader<'_>> {
    let root = json
        .as_object()
        .ok_or_else(|| ConfluxError::InvalidJson("message must be a json object".into()))?;
    let internal = match root.get(INTERNAL_NS) {
        None => None,
        Some(Json::Object(m)) => Some(m),
        Some(_) => {
            return Err(ConfluxError::field(INTERNAL_NS, "expected object"));
        }
    };
    Ok(JsonReader { root, internal })
}

/// Type named by a document, needed before choosing what to build.
pub fn peek_type(json: &Json) -> Result<MsgType> {
    let r = reader(json)?;
    let t = r
        .internal
        .and_then(|m| m.get("type"))
        .and_then(Json::as_str)
        .ok_or_else(|| ConfluxError::field("type", "missing"))?;
    t.parse()
}

/// Build a fresh `M` from `json`.
pub fn from_json<M: Msg>(json: &Json) -> Result<M> {
    let mut fresh = M::blank();
    field::process_fields(&mut fresh, &mut reader(json)?)?;
    Ok(fresh)
}

/// Apply `s` on top of `msg`; `msg` is untouched unless every field parses.
pub fn init_from_json<M: Msg>(msg: &mut M, s: &str) -> Result<()> {
    let json: Json = serde_json::from_str(s)?;
    let mut staged = msg.clone();
    field::process_fields(&mut staged, &mut reader(&json)?)?;
    *msg = staged;
    Ok(())
}
