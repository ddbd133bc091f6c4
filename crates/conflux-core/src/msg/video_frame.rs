//! Raw video frames.

use std::str::FromStr;

use crate::error::{ConfluxError, Result};
use crate::value::{Buf, Value};

use super::data::buf_row;
use super::field::{conv, field_table, scalar_row, FieldDescriptor, FieldId};
use super::{Msg, MsgHeader, MsgType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFmt {
    Rgb24,
    #[default]
    Rgba,
    Bgr24,
    Bgra,
    I420,
    I422,
    Nv21,
    Nv12,
}

impl PixelFmt {
    pub fn as_str(self) -> &'static str {
        match self {
            PixelFmt::Rgb24 => "rgb24",
            PixelFmt::Rgba => "rgba",
            PixelFmt::Bgr24 => "bgr24",
            PixelFmt::Bgra => "bgra",
            PixelFmt::I420 => "i420",
            PixelFmt::I422 => "i422",
            PixelFmt::Nv21 => "nv21",
            PixelFmt::Nv12 => "nv12",
        }
    }
}

impl FromStr for PixelFmt {
    type Err = ConfluxError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "rgb24" => PixelFmt::Rgb24,
            "rgba" => PixelFmt::Rgba,
            "bgr24" => PixelFmt::Bgr24,
            "bgra" => PixelFmt::Bgra,
            "i420" => PixelFmt::I420,
            "i422" => PixelFmt::I422,
            "nv21" => PixelFmt::Nv21,
            "nv12" => PixelFmt::Nv12,
            other => {
                return Err(ConfluxError::field(
                    "pixel_fmt",
                    format!("unknown pixel format `{other}`"),
                ))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub(crate) header: MsgHeader,
    pub pixel_fmt: PixelFmt,
    pub timestamp: i64,
    pub width: i32,
    pub height: i32,
    pub is_eof: bool,
    pub(crate) buf: Buf,
}

static FIELDS: &[FieldDescriptor<VideoFrame>] = field_table!(VideoFrame;
    FieldDescriptor::<VideoFrame> {
        id: FieldId::PixelFmt,
        name: "pixel_fmt",
        user_defined: false,
        copy: Some(|dst, src| dst.pixel_fmt = src.pixel_fmt),
        get: |m| Value::from(m.pixel_fmt.as_str()),
        set: Some(|m, v| {
            m.pixel_fmt = PixelFmt::from_str(&conv::string("pixel_fmt", v)?)?;
            Ok(())
        }),
    },
    scalar_row!(VideoFrame, Timestamp, "timestamp", timestamp, get_i64),
    scalar_row!(VideoFrame, Width, "width", width, get_i32),
    scalar_row!(VideoFrame, Height, "height", height, get_i32),
    scalar_row!(VideoFrame, IsEof, "is_eof", is_eof, get_bool),
    buf_row!(VideoFrame),
);

impl VideoFrame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: MsgHeader::named(name),
            pixel_fmt: PixelFmt::Rgba,
            timestamp: 0,
            width: 0,
            height: 0,
            is_eof: false,
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

    pub fn alloc_buf(&mut self, len: usize) -> &mut [u8] {
        self.buf = Buf::alloc(len);
        self.buf.as_mut_slice().unwrap_or_default()
    }
}

impl Msg for VideoFrame {
    const MSG_TYPE: MsgType = MsgType::VideoFrame;

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
    fn defaults_and_nested_internal_peek() {
        let mut f = VideoFrame::new("cam");
        assert_eq!(f.pixel_fmt, PixelFmt::Rgba);
        assert!(!f.is_eof);

        f.set_property("_conflux.width", 640i64).unwrap();
        f.set_property("_conflux.src.extension", "camera").unwrap();
        assert_eq!(f.width, 640);
        assert_eq!(f.src().extension.as_deref(), Some("camera"));
        assert_eq!(
            f.peek_property("_conflux.src.extension").unwrap(),
            Some(Value::from("camera"))
        );
        assert!(f.set_property("_conflux.type", "data").is_err());
        assert!(f.set_property("_conflux.nope", 1i64).is_err());
    }
}
