//! Typed messages exchanged between extensions.
//!
//! Five concrete shapes share one header (name, source, destinations,
//! properties) and differ in their own fields. Generic behavior lives on the
//! [`Msg`] trait and is driven by each type's field table.

pub mod audio_frame;
pub mod cmd;
pub mod cmd_result;
pub mod connection;
pub mod data;
pub mod envelope;
pub mod field;
pub mod json;
pub mod loc;
pub mod video_frame;

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfluxError, Result};
use crate::value::Value;

pub use audio_frame::{AudioFrame, AudioFrameDataFmt};
pub use cmd::{new_cmd_id, Cmd, CmdBase};
pub use cmd_result::{CmdResult, StatusCode};
pub use connection::{ConnectionHandle, WeakConnection};
pub use data::Data;
pub use envelope::SharedMsg;
pub use field::{FieldData, FieldDescriptor, FieldId, FieldVisitor, INTERNAL_NS};
pub use loc::Loc;
pub use video_frame::{PixelFmt, VideoFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Cmd,
    CmdResult,
    Data,
    AudioFrame,
    VideoFrame,
}

impl MsgType {
    pub fn as_str(self) -> &'static str {
        match self {
            MsgType::Cmd => "cmd",
            MsgType::CmdResult => "cmd_result",
            MsgType::Data => "data",
            MsgType::AudioFrame => "audio_frame",
            MsgType::VideoFrame => "video_frame",
        }
    }
}

impl FromStr for MsgType {
    type Err = ConfluxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cmd" => Ok(MsgType::Cmd),
            "cmd_result" => Ok(MsgType::CmdResult),
            "data" => Ok(MsgType::Data),
            "audio_frame" => Ok(MsgType::AudioFrame),
            "video_frame" => Ok(MsgType::VideoFrame),
            other => Err(ConfluxError::field("type", format!("unknown message type `{other}`"))),
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields every message carries.
#[derive(Debug, Clone, PartialEq)]
pub struct MsgHeader {
    pub name: String,
    pub src: Loc,
    /// Empty means "not routed yet".
    pub dest: Vec<Loc>,
    /// Always an object.
    pub properties: Value,
}

impl MsgHeader {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            src: Loc::default(),
            dest: Vec::new(),
            properties: Value::object(),
        }
    }
}

impl Default for MsgHeader {
    fn default() -> Self {
        Self::named("")
    }
}

/// Behavior shared by every concrete message type.
pub trait Msg: Clone + fmt::Debug + Send + Sync + Sized + 'static {
    const MSG_TYPE: MsgType;

    /// Ordered field table; `type` is always the first row.
    fn fields() -> &'static [FieldDescriptor<Self>];
    /// A default-initialized instance, the base for clone and deserialize.
    fn blank() -> Self;
    fn header(&self) -> &MsgHeader;
    fn header_mut(&mut self) -> &mut MsgHeader;
    /// State that is not part of the field table but still travels on clone.
    fn copy_untracked(&mut self, _src: &Self) {}

    fn name(&self) -> &str {
        &self.header().name
    }

    fn set_name(&mut self, name: impl Into<String>) {
        self.header_mut().name = name.into();
    }

    fn src(&self) -> &Loc {
        &self.header().src
    }

    fn set_src(&mut self, loc: Loc) {
        self.header_mut().src = loc;
    }

    fn dests(&self) -> &[Loc] {
        &self.header().dest
    }

    fn set_dests(&mut self, dests: Vec<Loc>) {
        self.header_mut().dest = dests;
    }

    fn add_dest(&mut self, loc: Loc) {
        self.header_mut().dest.push(loc);
    }

    fn properties(&self) -> &Value {
        &self.header().properties
    }

    fn peek_property(&self, path: &str) -> Result<Option<Value>> {
        field::peek_property(self, path)
    }

    fn set_property(&mut self, path: &str, v: impl Into<Value>) -> Result<()> {
        field::set_property(self, path, v.into())
    }

    fn for_each_field(&mut self, visitor: &mut dyn FieldVisitor) -> Result<()> {
        field::process_fields(self, visitor)
    }

    fn inspect_fields(&self, visitor: &mut dyn FieldVisitor) -> Result<()> {
        field::inspect_fields(self, visitor)
    }

    fn clone_excluding(&self, excluded: &[FieldId]) -> Self {
        field::clone_excluding(self, excluded)
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        json::to_json(self)
    }

    fn to_json_string(&self) -> Result<String> {
        Ok(self.to_json()?.to_string())
    }

    fn from_json_str(s: &str) -> Result<Self> {
        json::from_json(&serde_json::from_str(s)?)
    }

    /// Apply a JSON document on top of this message; nothing changes on error.
    fn init_from_json(&mut self, s: &str) -> Result<()> {
        json::init_from_json(self, s)
    }
}

/// Any message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Cmd(Cmd),
    CmdResult(CmdResult),
    Data(Data),
    AudioFrame(AudioFrame),
    VideoFrame(VideoFrame),
}

macro_rules! each {
    ($self:expr, $m:ident => $body:expr) => {
        match $self {
            Message::Cmd($m) => $body,
            Message::CmdResult($m) => $body,
            Message::Data($m) => $body,
            Message::AudioFrame($m) => $body,
            Message::VideoFrame($m) => $body,
        }
    };
}

impl Message {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Message::Cmd(_) => MsgType::Cmd,
            Message::CmdResult(_) => MsgType::CmdResult,
            Message::Data(_) => MsgType::Data,
            Message::AudioFrame(_) => MsgType::AudioFrame,
            Message::VideoFrame(_) => MsgType::VideoFrame,
        }
    }

    pub fn header(&self) -> &MsgHeader {
        each!(self, m => m.header())
    }

    pub fn header_mut(&mut self) -> &mut MsgHeader {
        each!(self, m => m.header_mut())
    }

    pub fn name(&self) -> &str {
        &self.header().name
    }

    pub fn src(&self) -> &Loc {
        &self.header().src
    }

    pub fn dests(&self) -> &[Loc] {
        &self.header().dest
    }

    pub fn peek_property(&self, path: &str) -> Result<Option<Value>> {
        each!(self, m => m.peek_property(path))
    }

    pub fn set_property(&mut self, path: &str, v: impl Into<Value>) -> Result<()> {
        let v = v.into();
        each!(self, m => m.set_property(path, v))
    }

    pub fn for_each_field(&mut self, visitor: &mut dyn FieldVisitor) -> Result<()> {
        each!(self, m => m.for_each_field(visitor))
    }

    pub fn clone_excluding(&self, excluded: &[FieldId]) -> Message {
        match self {
            Message::Cmd(m) => Message::Cmd(m.clone_excluding(excluded)),
            Message::CmdResult(m) => Message::CmdResult(m.clone_excluding(excluded)),
            Message::Data(m) => Message::Data(m.clone_excluding(excluded)),
            Message::AudioFrame(m) => Message::AudioFrame(m.clone_excluding(excluded)),
            Message::VideoFrame(m) => Message::VideoFrame(m.clone_excluding(excluded)),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        each!(self, m => m.to_json())
    }

    /// Deserialize any message, dispatching on its `type` field.
    pub fn from_json_str(s: &str) -> Result<Message> {
        let json: serde_json::Value = serde_json::from_str(s)?;
        match json::peek_type(&json)? {
            MsgType::Cmd => json::from_json(&json).map(Message::Cmd),
            MsgType::CmdResult => json::from_json(&json).map(Message::CmdResult),
            MsgType::Data => json::from_json(&json).map(Message::Data),
            MsgType::AudioFrame => json::from_json(&json).map(Message::AudioFrame),
            MsgType::VideoFrame => json::from_json(&json).map(Message::VideoFrame),
        }
    }

    pub fn init_from_json(&mut self, s: &str) -> Result<()> {
        each!(self, m => m.init_from_json(s))
    }
}

macro_rules! message_from {
    ($($t:ident),*) => {
        $(impl From<$t> for Message {
            fn from(m: $t) -> Self {
                Message::$t(m)
            }
        })*
    };
}

message_from!(Cmd, CmdResult, Data, AudioFrame, VideoFrame);
