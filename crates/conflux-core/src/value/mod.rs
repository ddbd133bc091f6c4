//! Recursive value tree used for message properties and field views.
//!
//! A `Value` owns its children: arrays and objects form a single-parent tree.
//! Objects keep insertion order and unique keys.

pub mod buf;
pub mod json;
pub mod path;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfluxError, Result};

pub use buf::Buf;
pub use path::PathItem;

/// Opaque pointer payload. Compared by identity, never serialized.
#[derive(Clone)]
pub struct ValuePtr(Arc<dyn Any + Send + Sync>);

impl ValuePtr {
    pub fn new<T: Any + Send + Sync>(v: T) -> Self {
        Self(Arc::new(v))
    }

    pub fn from_arc(inner: Arc<dyn Any + Send + Sync>) -> Self {
        Self(inner)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for ValuePtr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ValuePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValuePtr({:p})", Arc::as_ptr(&self.0))
    }
}

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Buf(Buf),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
    Ptr(ValuePtr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Null,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    String,
    Buf,
    Array,
    Object,
    Ptr,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int8 => "int8",
            ValueType::Int16 => "int16",
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::Uint8 => "uint8",
            ValueType::Uint16 => "uint16",
            ValueType::Uint32 => "uint32",
            ValueType::Uint64 => "uint64",
            ValueType::Float32 => "float32",
            ValueType::Float64 => "float64",
            ValueType::String => "string",
            ValueType::Buf => "buf",
            ValueType::Array => "array",
            ValueType::Object => "object",
            ValueType::Ptr => "ptr",
        }
    }
}

impl PartialEq for Value {
    /// Objects compare as maps: member order does not matter.
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int8(a), Int8(b)) => a == b,
            (Int16(a), Int16(b)) => a == b,
            (Int32(a), Int32(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Uint8(a), Uint8(b)) => a == b,
            (Uint16(a), Uint16(b)) => a == b,
            (Uint32(a), Uint32(b)) => a == b,
            (Uint64(a), Uint64(b)) => a == b,
            (Float32(a), Float32(b)) => a == b,
            (Float64(a), Float64(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Buf(a), Buf(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Object(a), Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| other.get(k).is_some_and(|w| v == w))
            }
            (Ptr(a), Ptr(b)) => a == b,
            _ => false,
        }
    }
}

// 2^53: largest magnitude an f64 holds for every integer below it.
const F64_EXACT_INT: i128 = 1 << 53;
const F32_EXACT_INT: i128 = 1 << 24;

macro_rules! int_getter {
    ($(#[$m:meta])* $name:ident, $t:ty) => {
        $(#[$m])*
        pub fn $name(&self) -> Result<$t> {
            let wide = self.as_wide_int().ok_or_else(|| self.mismatch(stringify!($t)))?;
            <$t>::try_from(wide).map_err(|_| {
                ConfluxError::InvalidArgument(format!(
                    "{wide} is out of range for {}",
                    stringify!($t)
                ))
            })
        }
    };
}

impl Value {
    pub fn object() -> Self {
        Value::Object(Vec::new())
    }

    pub fn array() -> Self {
        Value::Array(Vec::new())
    }

    pub fn ptr<T: Any + Send + Sync>(v: T) -> Self {
        Value::Ptr(ValuePtr::new(v))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int8(_) => ValueType::Int8,
            Value::Int16(_) => ValueType::Int16,
            Value::Int32(_) => ValueType::Int32,
            Value::Int64(_) => ValueType::Int64,
            Value::Uint8(_) => ValueType::Uint8,
            Value::Uint16(_) => ValueType::Uint16,
            Value::Uint32(_) => ValueType::Uint32,
            Value::Uint64(_) => ValueType::Uint64,
            Value::Float32(_) => ValueType::Float32,
            Value::Float64(_) => ValueType::Float64,
            Value::String(_) => ValueType::String,
            Value::Buf(_) => ValueType::Buf,
            Value::Array(_) => ValueType::Array,
            Value::Object(_) => ValueType::Object,
            Value::Ptr(_) => ValueType::Ptr,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.value_type().as_str()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn mismatch(&self, wanted: &str) -> ConfluxError {
        ConfluxError::InvalidArgument(format!("expected {wanted}, found {}", self.type_name()))
    }

    fn as_wide_int(&self) -> Option<i128> {
        match *self {
            Value::Int8(v) => Some(v.into()),
            Value::Int16(v) => Some(v.into()),
            Value::Int32(v) => Some(v.into()),
            Value::Int64(v) => Some(v.into()),
            Value::Uint8(v) => Some(v.into()),
            Value::Uint16(v) => Some(v.into()),
            Value::Uint32(v) => Some(v.into()),
            Value::Uint64(v) => Some(v.into()),
            _ => None,
        }
    }

    pub fn get_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(other.mismatch("bool")),
        }
    }

    int_getter!(
        /// Any integer variant whose value fits.
        get_i8, i8
    );
    int_getter!(get_i16, i16);
    int_getter!(get_i32, i32);
    int_getter!(get_i64, i64);
    int_getter!(get_u8, u8);
    int_getter!(get_u16, u16);
    int_getter!(get_u32, u32);
    int_getter!(get_u64, u64);

    /// Floats, and integers within the exactly-representable range.
    pub fn get_f64(&self) -> Result<f64> {
        match *self {
            Value::Float64(v) => Ok(v),
            Value::Float32(v) => Ok(v.into()),
            _ => match self.as_wide_int() {
                Some(i) if i.abs() <= F64_EXACT_INT => Ok(i as f64),
                Some(i) => Err(ConfluxError::InvalidArgument(format!(
                    "{i} is not exactly representable as float64"
                ))),
                None => Err(self.mismatch("float64")),
            },
        }
    }

    pub fn get_f32(&self) -> Result<f32> {
        match *self {
            Value::Float32(v) => Ok(v),
            Value::Float64(v) => {
                let narrowed = v as f32;
                if f64::from(narrowed) == v || v.is_nan() {
                    Ok(narrowed)
                } else {
                    Err(ConfluxError::InvalidArgument(format!(
                        "{v} is not exactly representable as float32"
                    )))
                }
            }
            _ => match self.as_wide_int() {
                Some(i) if i.abs() <= F32_EXACT_INT => Ok(i as f32),
                Some(i) => Err(ConfluxError::InvalidArgument(format!(
                    "{i} is not exactly representable as float32"
                ))),
                None => Err(self.mismatch("float32")),
            },
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn as_buf(&self) -> Result<&Buf> {
        match self {
            Value::Buf(b) => Ok(b),
            other => Err(other.mismatch("buf")),
        }
    }

    pub fn as_array(&self) -> Result<&[Value]> {
        match self {
            Value::Array(a) => Ok(a),
            other => Err(other.mismatch("array")),
        }
    }

    pub fn as_object(&self) -> Result<&[(String, Value)]> {
        match self {
            Value::Object(o) => Ok(o),
            other => Err(other.mismatch("object")),
        }
    }

    /// Object member lookup; `None` for non-objects.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(o) => o.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Object(o) => o.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Insert or replace an object member. Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, v: Value) -> Result<Option<Value>> {
        let Value::Object(o) = self else {
            return Err(self.mismatch("object"));
        };
        let key = key.into();
        match o.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Ok(Some(std::mem::replace(slot, v))),
            None => {
                o.push((key, v));
                Ok(None)
            }
        }
    }

    pub fn remove_key(&mut self, key: &str) -> Option<Value> {
        let Value::Object(o) = self else { return None; };
        let idx = o.iter().position(|(k, _)| k == key)?;
        Some(o.remove(idx).1)
    }

    /// Recursively merge `other` into `self`.
    ///
    /// Objects merge member-wise; any other pairing replaces `self`.
    pub fn merge_from(&mut self, other: Value) {
        match (self, other) {
            (Value::Object(dst), Value::Object(src)) => {
                for (k, v) in src {
                    match dst.iter_mut().find(|(dk, _)| *dk == k) {
                        Some((_, slot)) => slot.merge_from(v),
                        None => dst.push((k, v)),
                    }
                }
            }
            (slot, v) => *slot = v,
        }
    }

    /// Convert to `target`, preserving the value exactly or failing.
    pub fn coerce(&self, target: ValueType) -> Result<Value> {
        if self.value_type() == target {
            return Ok(self.clone());
        }
        Ok(match target {
            ValueType::Null => Value::Null,
            ValueType::Bool => Value::Bool(self.get_bool()?),
            ValueType::Int8 => Value::Int8(self.get_i8()?),
            ValueType::Int16 => Value::Int16(self.get_i16()?),
            ValueType::Int32 => Value::Int32(self.get_i32()?),
            ValueType::Int64 => Value::Int64(self.get_i64()?),
            ValueType::Uint8 => Value::Uint8(self.get_u8()?),
            ValueType::Uint16 => Value::Uint16(self.get_u16()?),
            ValueType::Uint32 => Value::Uint32(self.get_u32()?),
            ValueType::Uint64 => Value::Uint64(self.get_u64()?),
            ValueType::Float32 => Value::Float32(self.get_f32()?),
            ValueType::Float64 => Value::Float64(self.get_f64()?),
            ValueType::Buf => match self {
                Value::String(s) => Value::Buf(Buf::from_vec(crate::base64::decode(s)?)),
                other => return Err(other.mismatch("buf")),
            },
            ValueType::String
            | ValueType::Array
            | ValueType::Object
            | ValueType::Ptr => return Err(self.mismatch(target.as_str())),
        })
    }
}

macro_rules! from_scalar {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

from_scalar!(
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Buf => Buf,
    Vec<Value> => Array,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_getters_are_range_checked() {
        let v = Value::Int64(300);
        assert_eq!(v.get_i16().unwrap(), 300);
        assert_eq!(v.get_u32().unwrap(), 300);
        assert!(v.get_i8().is_err());
        assert!(v.get_u8().is_err());
        assert!(Value::Int8(-1).get_u64().is_err());
        assert_eq!(Value::Uint64(u64::MAX).get_u64().unwrap(), u64::MAX);
        assert!(Value::Uint64(u64::MAX).get_i64().is_err());
        assert!(Value::from("7").get_i32().is_err());
    }

    #[test]
    fn float_getters() {
        assert_eq!(Value::Int32(3).get_f64().unwrap(), 3.0);
        assert_eq!(Value::Float64(0.5).get_f32().unwrap(), 0.5);
        assert!(Value::Float64(0.1).get_f32().is_err());
        assert!(Value::Int64(i64::MAX).get_f64().is_err());
    }

    #[test]
    fn object_insert_replaces() {
        let mut o = Value::object();
        assert!(o.insert("a", 1i32.into()).unwrap().is_none());
        assert_eq!(o.insert("a", 2i32.into()).unwrap(), Some(Value::Int32(1)));
        assert_eq!(o.as_object().unwrap().len(), 1);
        assert!(Value::Int8(0).insert("x", Value::Null).is_err());
    }

    #[test]
    fn merge_is_recursive() {
        let mut base = Value::Object(vec![
            ("a".into(), Value::Object(vec![("x".into(), 1i64.into())])),
            ("b".into(), 2i64.into()),
        ]);
        base.merge_from(Value::Object(vec![(
            "a".into(),
            Value::Object(vec![("y".into(), 3i64.into())]),
        )]));
        let a = base.get("a").unwrap();
        assert_eq!(a.get("x"), Some(&Value::Int64(1)));
        assert_eq!(a.get("y"), Some(&Value::Int64(3)));
        assert_eq!(base.get("b"), Some(&Value::Int64(2)));
    }

    #[test]
    fn ptr_identity() {
        let p = Value::ptr(5u32);
        let q = p.clone();
        assert_eq!(p, q);
        assert_ne!(p, Value::ptr(5u32));
    }
}
