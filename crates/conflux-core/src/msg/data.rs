//! Opaque data messages.

use crate::value::{Buf, Value};

use super::field::{conv, field_table, FieldDescriptor, FieldId};
use super::{Msg, MsgHeader, MsgType};

#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub(crate) header: MsgHeader,
    pub(crate) buf: Buf,
}

/// `buf` row for any type with a `buf: Buf` member.
macro_rules! buf_row {
    ($m:ty) => {
        FieldDescriptor::<$m> {
            id: FieldId::Buf,
            name: "buf",
            user_defined: false,
            copy: Some(|dst, src| dst.buf = src.buf.clone()),
            get: |m| Value::Buf(m.buf.clone()),
            set: Some(|m, v| {
                m.buf = match v {
                    Value::Buf(b) => b,
                    Value::Null => Buf::empty(),
                    other => conv::narrow("buf", other.coerce($crate::value::ValueType::Buf))?
                        .as_buf()?
                        .clone(),
                };
                Ok(())
            }),
        }
    };
}

pub(crate) use buf_row;

static FIELDS: &[FieldDescriptor<Data>] = field_table!(Data; buf_row!(Data));

impl Data {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: MsgHeader::named(name),
            buf: Buf::empty(),
        }
    }

    pub fn buf(&self) -> &Buf {
        &self.buf
    }

    pub fn buf_mut(&mut self) -> &mut Buf {
        &mut self.buf
    }

    pub fn set_buf(&mut self, buf: impl Into<Buf>) {
        self.buf = buf.into();
    }

    /// Replace the payload with `len` zeroed, writable bytes.
    pub fn alloc_buf(&mut self, len: usize) -> &mut [u8] {
        self.buf = Buf::alloc(len);
        self.buf.as_mut_slice().unwrap_or_default()
    }
}

impl Msg for Data {
    const MSG_TYPE: MsgType = MsgType::Data;

    fn fields() -> &'static [FieldDescriptor<Self>] {
        FIELDS
    }

    fn blank() -> Self {
        Self::new("")
    }

    fn header(&self) -> &MsgHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MsgHeader {
        &mut self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_buffer_is_shared_by_clones() {
        let mut d = Data::new("frame");
        d.alloc_buf(3).copy_from_slice(&[1, 2, 3]);
        let handed_off = d.buf_mut().release_ownership();

        let copy = d.clone();
        assert!(!copy.buf().is_owned());
        assert_eq!(copy.buf().as_slice().as_ptr(), handed_off.as_ptr());
        assert_eq!(hex::encode(copy.buf().as_slice()), "010203");
    }
}
