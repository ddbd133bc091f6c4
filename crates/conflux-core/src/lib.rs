//! conflux core: the message model, value tree, and shared error surface.
//!
//! This crate defines the typed messages that flow between extensions, the
//! field-table protocol every serializer is driven by, and the reference-counted
//! envelope used to hand a message to several holders at once. It carries no
//! runtime or thread dependencies so codecs and bindings can reuse it directly.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed input surfaces as `ConfluxError`/`Result`; the only process-level
//! exit is an allocation failure (see [`fatal`]).

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod base64;
pub mod error;
pub mod fatal;
pub mod msg;
pub mod value;

/// Shared result type.
pub use error::{ConfluxError, ErrorCode, Result};
pub use msg::{
    AudioFrame, Cmd, CmdResult, Data, Loc, Message, Msg, MsgType, SharedMsg, StatusCode, VideoFrame,
};
pub use value::{Buf, Value, ValueType};
