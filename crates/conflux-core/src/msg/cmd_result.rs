//! Results flowing back to the sender of a command.

use std::str::FromStr;

use crate::error::{ConfluxError, Result};
use crate::value::Value;

use super::cmd::{cmd_field_table, Cmd, CmdBase};
use super::connection::WeakConnection;
use super::field::{conv, FieldDescriptor, FieldId};
use super::{Msg, MsgHeader, MsgType};

/// Property that carries a human-readable result payload.
pub const DETAIL: &str = "detail";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusCode {
    #[default]
    Ok,
    Error,
}

impl StatusCode {
    pub fn code(self) -> i64 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::Error => 1,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(StatusCode::Ok),
            1 => Ok(StatusCode::Error),
            other => Err(ConfluxError::field("status_code", format!("unknown status {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CmdResult {
    pub(crate) header: MsgHeader,
    pub(crate) base: CmdBase,
    pub(crate) original_cmd_type: Option<MsgType>,
    pub(crate) original_cmd_name: Option<String>,
    pub(crate) status_code: StatusCode,
    pub(crate) is_final: bool,
    pub(crate) is_completed: bool,
}

static FIELDS: &[FieldDescriptor<CmdResult>] = cmd_field_table!(CmdResult;
    FieldDescriptor::<CmdResult> {
        id: FieldId::OriginalCmdType,
        name: "original_cmd_type",
        user_defined: false,
        copy: Some(|dst, src| dst.original_cmd_type = src.original_cmd_type),
        get: |m| {
            m.original_cmd_type
                .map(|t| Value::from(t.as_str()))
                .unwrap_or(Value::Null)
        },
        set: Some(|m, v| {
            m.original_cmd_type = match conv::opt_string("original_cmd_type", v)? {
                Some(s) => Some(MsgType::from_str(&s)?),
                None => None,
            };
            Ok(())
        }),
    },
    FieldDescriptor::<CmdResult> {
        id: FieldId::OriginalCmdName,
        name: "original_cmd_name",
        user_defined: false,
        copy: Some(|dst, src| dst.original_cmd_name = src.original_cmd_name.clone()),
        get: |m| conv::from_opt(&m.original_cmd_name),
        set: Some(|m, v| {
            m.original_cmd_name = conv::opt_string("original_cmd_name", v)?;
            Ok(())
        }),
    },
    FieldDescriptor::<CmdResult> {
        id: FieldId::StatusCode,
        name: "status_code",
        user_defined: false,
        copy: Some(|dst, src| dst.status_code = src.status_code),
        get: |m| Value::Int64(m.status_code.code()),
        set: Some(|m, v| {
            m.status_code = StatusCode::from_code(conv::narrow("status_code", v.get_i64())?)?;
            Ok(())
        }),
    },
    FieldDescriptor::<CmdResult> {
        id: FieldId::IsFinal,
        name: "is_final",
        user_defined: false,
        copy: Some(|dst, src| dst.is_final = src.is_final),
        get: |m| Value::Bool(m.is_final),
        set: Some(|m, v| {
            m.is_final = conv::narrow("is_final", v.get_bool())?;
            Ok(())
        }),
    },
    FieldDescriptor::<CmdResult> {
        id: FieldId::IsCompleted,
        name: "is_completed",
        user_defined: false,
        copy: Some(|dst, src| dst.is_completed = src.is_completed),
        get: |m| Value::Bool(m.is_completed),
        set: Some(|m, v| {
            m.is_completed = conv::narrow("is_completed", v.get_bool())?;
            Ok(())
        }),
    },
);

impl CmdResult {
    /// A final result not yet tied to any command.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status_code: status,
            ..Self::blank()
        }
    }

    /// A final result answering `cmd`: same id, sequence and origin.
    pub fn for_cmd(status: StatusCode, cmd: &Cmd) -> Self {
        let mut r = Self::new(status);
        r.base.cmd_id = cmd.base.cmd_id.clone();
        r.base.seq_id = cmd.base.seq_id.clone();
        r.base.original_connection = cmd.base.original_connection.clone();
        r.original_cmd_type = Some(MsgType::Cmd);
        r.original_cmd_name = Some(cmd.name().to_owned());
        r.header.name = cmd.name().to_owned();
        r
    }

    /// An error result for `cmd` whose detail explains why.
    pub fn error_for(cmd: &Cmd, detail: impl Into<String>) -> Self {
        let mut r = Self::for_cmd(StatusCode::Error, cmd);
        r.set_detail(detail.into());
        r
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == StatusCode::Ok
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn set_final(&mut self, is_final: bool) {
        self.is_final = is_final;
    }

    /// True on the last result delivered for a command, after every
    /// destination it fanned out to has answered.
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    pub fn set_completed(&mut self, done: bool) {
        self.is_completed = done;
    }

    pub fn cmd_id(&self) -> &str {
        &self.base.cmd_id
    }

    pub fn set_cmd_id(&mut self, id: impl Into<String>) {
        self.base.cmd_id = id.into();
    }

    pub fn seq_id(&self) -> Option<&str> {
        self.base.seq_id.as_deref()
    }

    pub fn base(&self) -> &CmdBase {
        &self.base
    }

    pub fn original_connection(&self) -> Option<&WeakConnection> {
        self.base.original_connection.as_ref()
    }

    pub fn set_original_connection(&mut self, conn: WeakConnection) {
        self.base.original_connection = Some(conn);
    }

    pub fn original_cmd_type(&self) -> Option<MsgType> {
        self.original_cmd_type
    }

    pub fn original_cmd_name(&self) -> Option<&str> {
        self.original_cmd_name.as_deref()
    }

    pub fn set_original_cmd(&mut self, ty: MsgType, name: impl Into<String>) {
        self.original_cmd_type = Some(ty);
        self.original_cmd_name = Some(name.into());
    }

    pub fn detail(&self) -> Option<&Value> {
        self.header.properties.get(DETAIL)
    }

    pub fn set_detail(&mut self, detail: impl Into<Value>) {
        // properties is always an object, so insert cannot fail
        let _ = self.header.properties.insert(DETAIL, detail.into());
    }
}

impl Msg for CmdResult {
    const MSG_TYPE: MsgType = MsgType::CmdResult;

    fn fields() -> &'static [FieldDescriptor<Self>] {
        FIELDS
    }

    fn blank() -> Self {
        Self {
            header: MsgHeader::default(),
            base: CmdBase::default(),
            original_cmd_type: None,
            original_cmd_name: None,
            status_code: StatusCode::Ok,
            is_final: true,
            is_completed: false,
        }
    }

    fn header(&self) -> &MsgHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MsgHeader {
        &mut self.header
    }

    fn copy_untracked(&mut self, src: &Self) {
        self.base.original_connection = src.base.original_connection.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_cmd_copies_correlation() {
        let mut cmd = Cmd::new("hello");
        cmd.set_seq_id("42");
        let r = CmdResult::error_for(&cmd, "boom");
        assert_eq!(r.cmd_id(), cmd.cmd_id());
        assert_eq!(r.seq_id(), Some("42"));
        assert_eq!(r.original_cmd_name(), Some("hello"));
        assert_eq!(r.original_cmd_type(), Some(MsgType::Cmd));
        assert_eq!(r.detail(), Some(&Value::from("boom")));
        assert!(r.is_final());
        assert!(!r.is_ok());
    }

    #[test]
    fn status_code_via_internal_property() {
        let mut r = CmdResult::new(StatusCode::Ok);
        r.set_property("_conflux.status_code", 1i64).unwrap();
        assert_eq!(r.status_code(), StatusCode::Error);
        assert!(r.set_property("_conflux.status_code", 9i64).is_err());
        assert_eq!(r.status_code(), StatusCode::Error);
    }
}
