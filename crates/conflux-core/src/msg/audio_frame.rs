//! PCM audio frames.

use std::str::FromStr;

use crate::error::{ConfluxError, Result};
use crate::value::{Buf, Value};

use super::data::buf_row;
use super::field::{conv, field_table, scalar_row, FieldDescriptor, FieldId};
use super::{Msg, MsgHeader, MsgType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFrameDataFmt {
    /// Samples of all channels interleaved in one plane.
    #[default]
    Interleave,
    /// One plane per channel.
    NonInterleave,
}

impl AudioFrameDataFmt {
    pub fn as_str(self) -> &'static str {
        match self {
            AudioFrameDataFmt::Interleave => "interleave",
            AudioFrameDataFmt::NonInterleave => "non_interleave",
        }
    }
}

impl FromStr for AudioFrameDataFmt {
    type Err = ConfluxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "interleave" => Ok(AudioFrameDataFmt::Interleave),
            "non_interleave" => Ok(AudioFrameDataFmt::NonInterleave),
            other => Err(ConfluxError::field("data_fmt", format!("unknown format `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub(crate) header: MsgHeader,
    pub timestamp: i64,
    pub sample_rate: i32,
    pub bytes_per_sample: i32,
    pub samples_per_channel: i32,
    pub number_of_channel: i32,
    pub channel_layout: u64,
    pub data_fmt: AudioFrameDataFmt,
    pub line_size: i32,
    pub is_eof: bool,
    pub(crate) buf: Buf,
}

static FIELDS: &[FieldDescriptor<AudioFrame>] = field_table!(AudioFrame;
    scalar_row!(AudioFrame, Timestamp, "timestamp", timestamp, get_i64),
    scalar_row!(AudioFrame, SampleRate, "sample_rate", sample_rate, get_i32),
    scalar_row!(AudioFrame, BytesPerSample, "bytes_per_sample", bytes_per_sample, get_i32),
    scalar_row!(AudioFrame, SamplesPerChannel, "samples_per_channel", samples_per_channel, get_i32),
    scalar_row!(AudioFrame, NumberOfChannel, "number_of_channel", number_of_channel, get_i32),
    scalar_row!(AudioFrame, ChannelLayout, "channel_layout", channel_layout, get_u64),
    FieldDescriptor::<AudioFrame> {
        id: FieldId::DataFmt,
        name: "data_fmt",
        user_defined: false,
        copy: Some(|dst, src| dst.data_fmt = src.data_fmt),
        get: |m| Value::from(m.data_fmt.as_str()),
        set: Some(|m, v| {
            m.data_fmt = AudioFrameDataFmt::from_str(&conv::string("data_fmt", v)?)?;
            Ok(())
        }),
    },
    scalar_row!(AudioFrame, LineSize, "line_size", line_size, get_i32),
    scalar_row!(AudioFrame, IsEof, "is_eof", is_eof, get_bool),
    buf_row!(AudioFrame),
);

impl AudioFrame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: MsgHeader::named(name),
            timestamp: 0,
            sample_rate: 0,
            bytes_per_sample: 0,
            samples_per_channel: 0,
            number_of_channel: 0,
            channel_layout: 0,
            data_fmt: AudioFrameDataFmt::Interleave,
            line_size: 0,
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

impl Msg for AudioFrame {
    const MSG_TYPE: MsgType = MsgType::AudioFrame;

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
    fn defaults() {
        let f = AudioFrame::new("pcm");
        assert_eq!(f.data_fmt, AudioFrameDataFmt::Interleave);
        assert_eq!(f.line_size, 0);
        assert!(!f.is_eof);
        assert!(f.buf().is_empty());
    }

    #[test]
    fn internal_fields_are_type_checked() {
        let mut f = AudioFrame::new("pcm");
        f.set_property("_conflux.sample_rate", 48_000i64).unwrap();
        assert_eq!(f.sample_rate, 48_000);
        assert!(f.set_property("_conflux.sample_rate", u64::MAX).is_err());
        assert!(f.set_property("_conflux.data_fmt", "planar").is_err());
        f.set_property("_conflux.data_fmt", "non_interleave").unwrap();
        assert_eq!(
            f.peek_property("_conflux.data_fmt").unwrap(),
            Some(Value::from("non_interleave"))
        );
    }
}
