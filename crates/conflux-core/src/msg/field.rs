//! Field tables: the single place each message type lists its fields.
//!
//! Every concrete message publishes an ordered `&'static [FieldDescriptor]`.
//! Clone, JSON, property access and external codecs all walk that table, so a
//! new message type only needs its fields listed once. The `type` field is
//! always first; visitors may branch on it for the fields that follow.

use crate::error::{ConfluxError, Result};
use crate::value::path::{self, PathItem};
use crate::value::Value;

use super::{Msg, MsgType};

/// Reserved top-level property that addresses internal fields.
pub const INTERNAL_NS: &str = "_conflux";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    Type,
    Name,
    Source,
    Destination,
    Properties,
    CmdId,
    ParentCmdId,
    SeqId,
    OriginalCmdType,
    OriginalCmdName,
    StatusCode,
    IsFinal,
    IsCompleted,
    Buf,
    Timestamp,
    SampleRate,
    BytesPerSample,
    SamplesPerChannel,
    NumberOfChannel,
    ChannelLayout,
    DataFmt,
    LineSize,
    IsEof,
    PixelFmt,
    Width,
    Height,
}

/// One row of a message type's field table.
pub struct FieldDescriptor<M: 'static> {
    pub id: FieldId,
    pub name: &'static str,
    /// Properties live at the JSON root instead of under [`INTERNAL_NS`].
    pub user_defined: bool,
    pub copy: Option<fn(&mut M, &M)>,
    pub get: fn(&M) -> Value,
    pub set: Option<fn(&mut M, Value) -> Result<()>>,
}

/// The view of one field handed to a [`FieldVisitor`].
#[derive(Debug)]
pub struct FieldData {
    pub id: FieldId,
    pub name: &'static str,
    pub user_defined: bool,
    pub value: Value,
    changed: bool,
}

impl FieldData {
    /// Replace the value; it is written back once the visitor returns.
    pub fn replace(&mut self, v: Value) {
        self.value = v;
        self.changed = true;
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }
}

/// Serializer / codec contract: called once per field, in table order.
pub trait FieldVisitor {
    fn visit(&mut self, msg_type: MsgType, field: &mut FieldData) -> Result<()>;
}

impl<F> FieldVisitor for F
where
    F: FnMut(MsgType, &mut FieldData) -> Result<()>,
{
    fn visit(&mut self, msg_type: MsgType, field: &mut FieldData) -> Result<()> {
        self(msg_type, field)
    }
}

fn view<M: Msg>(msg: &M, d: &FieldDescriptor<M>) -> FieldData {
    FieldData {
        id: d.id,
        name: d.name,
        user_defined: d.user_defined,
        value: (d.get)(msg),
        changed: false,
    }
}

/// Read-only walk; changes made by the visitor are ignored.
pub fn inspect_fields<M: Msg>(msg: &M, visitor: &mut dyn FieldVisitor) -> Result<()> {
    for d in M::fields() {
        let mut data = view(msg, d);
        visitor.visit(M::MSG_TYPE, &mut data)?;
    }
    Ok(())
}

/// Walk that writes changed fields back. Stops at the first error; fields
/// already written stay written, so callers wanting atomicity work on a copy.
pub fn process_fields<M: Msg>(msg: &mut M, visitor: &mut dyn FieldVisitor) -> Result<()> {
    for d in M::fields() {
        let mut data = view(msg, d);
        visitor.visit(M::MSG_TYPE, &mut data)?;
        if data.changed {
            write_back(msg, d, data.value)?;
        }
    }
    Ok(())
}

fn write_back<M: Msg>(msg: &mut M, d: &FieldDescriptor<M>, v: Value) -> Result<()> {
    match d.set {
        Some(set) => set(msg, v).map_err(|e| match e {
            e @ ConfluxError::InvalidFieldValue { .. } => e,
            other => ConfluxError::field(d.name, other.to_string()),
        }),
        None if v == (d.get)(msg) => Ok(()),
        None => Err(ConfluxError::field(d.name, "field is read-only")),
    }
}

pub fn clone_excluding<M: Msg>(msg: &M, excluded: &[FieldId]) -> M {
    let mut out = M::blank();
    for d in M::fields() {
        if excluded.contains(&d.id) {
            continue;
        }
        if let Some(copy) = d.copy {
            copy(&mut out, msg);
        }
    }
    out.copy_untracked(msg);
    out
}

fn descriptor<M: Msg>(name: &str) -> Option<&'static FieldDescriptor<M>> {
    M::fields().iter().find(|d| d.name == name && !d.user_defined)
}

fn internal_object<M: Msg>(msg: &M) -> Value {
    Value::Object(
        M::fields()
            .iter()
            .filter(|d| !d.user_defined)
            .map(|d| (d.name.to_owned(), (d.get)(msg)))
            .collect(),
    )
}

/// `""` is the whole property tree, `_conflux.<field>...` an internal field.
pub fn peek_property<M: Msg>(msg: &M, path: &str) -> Result<Option<Value>> {
    if path.is_empty() {
        return Ok(Some(msg.header().properties.clone()));
    }
    let items = path::parse(path)?;
    match items.split_first() {
        Some((PathItem::Key(ns), rest)) if ns == INTERNAL_NS => match rest.split_first() {
            None => Ok(Some(internal_object(msg))),
            Some((PathItem::Key(field), deeper)) => Ok(descriptor::<M>(field)
                .map(|d| (d.get)(msg))
                .and_then(|v| v.peek_items(deeper).cloned())),
            Some((PathItem::Index(_), _)) => Ok(None),
        },
        _ => Ok(msg.header().properties.peek_items(&items).cloned()),
    }
}

pub fn set_property<M: Msg>(msg: &mut M, path: &str, v: Value) -> Result<()> {
    if path.is_empty() {
        if !matches!(v, Value::Object(_)) {
            return Err(ConfluxError::InvalidArgument(
                "message properties must be an object".into(),
            ));
        }
        msg.header_mut().properties = v;
        return Ok(());
    }
    let items = path::parse(path)?;
    match items.split_first() {
        Some((PathItem::Key(ns), rest)) if ns == INTERNAL_NS => {
            let Some((PathItem::Key(field), deeper)) = rest.split_first() else {
                return Err(ConfluxError::InvalidArgument(format!(
                    "`{path}` does not name an internal field"
                )));
            };
            let d = descriptor::<M>(field).ok_or_else(|| {
                ConfluxError::NotFound(format!("{} has no field `{field}`", M::MSG_TYPE.as_str()))
            })?;
            let mut current = (d.get)(msg);
            current
                .set_items(deeper, v)
                .map_err(|why| ConfluxError::field(d.name, why))?;
            write_back(msg, d, current)
        }
        _ => msg
            .header_mut()
            .properties
            .set_items(&items, v)
            .map_err(|why| ConfluxError::InvalidArgument(format!("bad property path `{path}`: {why}"))),
    }
}

/// Field-typed accessors shared by several tables.
pub(crate) mod conv {
    use super::*;

    pub fn string(field: &str, v: Value) -> Result<String> {
        match v {
            Value::String(s) => Ok(s),
            other => Err(ConfluxError::field(
                field,
                format!("expected string, found {}", other.type_name()),
            )),
        }
    }

    pub fn opt_string(field: &str, v: Value) -> Result<Option<String>> {
        match v {
            Value::Null => Ok(None),
            other => string(field, other).map(Some),
        }
    }

    pub fn from_opt(s: &Option<String>) -> Value {
        s.clone().map(Value::String).unwrap_or(Value::Null)
    }

    pub fn narrow<T>(field: &str, r: Result<T>) -> Result<T> {
        r.map_err(|e| ConfluxError::field(field, e.to_string()))
    }
}

/// Builds a field table: the header rows common to every message type
/// (`type` first, then name, source, destinations, properties) followed by
/// the type's own rows.
macro_rules! field_table {
    ($m:ty; $($row:expr),* $(,)?) => {
        &[
            $crate::msg::field::FieldDescriptor::<$m> {
                id: $crate::msg::field::FieldId::Type,
                name: "type",
                user_defined: false,
                copy: None,
                get: |_| $crate::value::Value::from(<$m as $crate::msg::Msg>::MSG_TYPE.as_str()),
                set: None,
            },
            $crate::msg::field::FieldDescriptor::<$m> {
                id: $crate::msg::field::FieldId::Name,
                name: "name",
                user_defined: false,
                copy: Some(|dst, src| dst.header.name = src.header.name.clone()),
                get: |m| $crate::value::Value::from(m.header.name.as_str()),
                set: Some(|m, v| {
                    m.header.name = $crate::msg::field::conv::string("name", v)?;
                    Ok(())
                }),
            },
            $crate::msg::field::FieldDescriptor::<$m> {
                id: $crate::msg::field::FieldId::Source,
                name: "src",
                user_defined: false,
                copy: Some(|dst, src| dst.header.src = src.header.src.clone()),
                get: |m| m.header.src.to_value(),
                set: Some(|m, v| {
                    m.header.src = match v {
                        $crate::value::Value::Null => $crate::msg::Loc::default(),
                        v => $crate::msg::Loc::from_value(&v)?,
                    };
                    Ok(())
                }),
            },
            $crate::msg::field::FieldDescriptor::<$m> {
                id: $crate::msg::field::FieldId::Destination,
                name: "dest",
                user_defined: false,
                copy: Some(|dst, src| dst.header.dest = src.header.dest.clone()),
                get: |m| {
                    $crate::value::Value::Array(m.header.dest.iter().map(|l| l.to_value()).collect())
                },
                set: Some(|m, v| {
                    m.header.dest = match v {
                        $crate::value::Value::Null => Vec::new(),
                        v => v
                            .as_array()?
                            .iter()
                            .map($crate::msg::Loc::from_value)
                            .collect::<$crate::error::Result<_>>()?,
                    };
                    Ok(())
                }),
            },
            $crate::msg::field::FieldDescriptor::<$m> {
                id: $crate::msg::field::FieldId::Properties,
                name: "properties",
                user_defined: true,
                copy: Some(|dst, src| dst.header.properties = src.header.properties.clone()),
                get: |m| m.header.properties.clone(),
                set: Some(|m, v| {
                    if !matches!(v, $crate::value::Value::Object(_)) {
                        return Err($crate::error::ConfluxError::field(
                            "properties",
                            "expected object",
                        ));
                    }
                    m.header.properties = v;
                    Ok(())
                }),
            },
            $($row),*
        ]
    };
}

pub(crate) use field_table;

/// Row for a plain scalar field stored directly on the message struct.
macro_rules! scalar_row {
    ($m:ty, $id:ident, $name:literal, $($field:ident).+, $getter:ident) => {
        $crate::msg::field::FieldDescriptor::<$m> {
            id: $crate::msg::field::FieldId::$id,
            name: $name,
            user_defined: false,
            copy: Some(|dst, src| dst.$($field).+ = src.$($field).+),
            get: |m| $crate::value::Value::from(m.$($field).+),
            set: Some(|m, v| {
                m.$($field).+ = $crate::msg::field::conv::narrow($name, v.$getter())?;
                Ok(())
            }),
        }
    };
}

pub(crate) use scalar_row;
