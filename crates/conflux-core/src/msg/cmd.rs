//! Commands: messages that expect one or more results.

use crate::value::Value;

use super::connection::WeakConnection;
use super::field::{conv, FieldDescriptor, FieldId};
use super::{Msg, MsgHeader, MsgType};

pub fn new_cmd_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Correlation state shared by commands and their results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CmdBase {
    pub cmd_id: String,
    /// Set when the id was replaced to break a routing loop.
    pub parent_cmd_id: Option<String>,
    pub seq_id: Option<String>,
    /// Relation only; never keeps the connection alive.
    pub original_connection: Option<WeakConnection>,
}

impl CmdBase {
    fn copy_untracked(&mut self, src: &CmdBase) {
        self.original_connection = src.original_connection.clone();
    }
}

/// Field table for a type with a `base: CmdBase` member: header rows, the
/// correlation rows, then the type's own rows.
macro_rules! cmd_field_table {
    ($m:ty; $($row:expr),* $(,)?) => {
        $crate::msg::field::field_table!($m;
            FieldDescriptor::<$m> {
                id: FieldId::CmdId,
                name: "cmd_id",
                user_defined: false,
                copy: Some(|dst, src| dst.base.cmd_id = src.base.cmd_id.clone()),
                get: |m| Value::from(m.base.cmd_id.as_str()),
                set: Some(|m, v| {
                    m.base.cmd_id = conv::opt_string("cmd_id", v)?.unwrap_or_default();
                    Ok(())
                }),
            },
            FieldDescriptor::<$m> {
                id: FieldId::ParentCmdId,
                name: "parent_cmd_id",
                user_defined: false,
                copy: Some(|dst, src| dst.base.parent_cmd_id = src.base.parent_cmd_id.clone()),
                get: |m| conv::from_opt(&m.base.parent_cmd_id),
                set: Some(|m, v| {
                    m.base.parent_cmd_id = conv::opt_string("parent_cmd_id", v)?;
                    Ok(())
                }),
            },
            FieldDescriptor::<$m> {
                id: FieldId::SeqId,
                name: "seq_id",
                user_defined: false,
                copy: Some(|dst, src| dst.base.seq_id = src.base.seq_id.clone()),
                get: |m| conv::from_opt(&m.base.seq_id),
                set: Some(|m, v| {
                    m.base.seq_id = conv::opt_string("seq_id", v)?;
                    Ok(())
                }),
            },
            $($row),*
        )
    };
}

pub(crate) use cmd_field_table;

#[derive(Debug, Clone, PartialEq)]
pub struct Cmd {
    pub(crate) header: MsgHeader,
    pub(crate) base: CmdBase,
}

static FIELDS: &[FieldDescriptor<Cmd>] = cmd_field_table!(Cmd;);

impl Cmd {
    /// A fresh command with a unique id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: MsgHeader::named(name),
            base: CmdBase {
                cmd_id: new_cmd_id(),
                ..CmdBase::default()
            },
        }
    }

    pub fn cmd_id(&self) -> &str {
        &self.base.cmd_id
    }

    pub fn set_cmd_id(&mut self, id: impl Into<String>) {
        self.base.cmd_id = id.into();
    }

    pub fn parent_cmd_id(&self) -> Option<&str> {
        self.base.parent_cmd_id.as_deref()
    }

    pub fn set_parent_cmd_id(&mut self, id: Option<String>) {
        self.base.parent_cmd_id = id;
    }

    pub fn seq_id(&self) -> Option<&str> {
        self.base.seq_id.as_deref()
    }

    pub fn set_seq_id(&mut self, id: impl Into<String>) {
        self.base.seq_id = Some(id.into());
    }

    pub fn original_connection(&self) -> Option<&WeakConnection> {
        self.base.original_connection.as_ref()
    }

    pub fn set_original_connection(&mut self, conn: WeakConnection) {
        self.base.original_connection = Some(conn);
    }

    pub fn base(&self) -> &CmdBase {
        &self.base
    }
}

impl Msg for Cmd {
    const MSG_TYPE: MsgType = MsgType::Cmd;

    fn fields() -> &'static [FieldDescriptor<Self>] {
        FIELDS
    }

    fn blank() -> Self {
        Self {
            header: MsgHeader::default(),
            base: CmdBase::default(),
        }
    }

    fn header(&self) -> &MsgHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut MsgHeader {
        &mut self.header
    }

    fn copy_untracked(&mut self, src: &Self) {
        self.base.copy_untracked(&src.base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::connection::ConnectionHandle;

    #[test]
    fn ids_are_unique() {
        assert_ne!(Cmd::new("a").cmd_id(), Cmd::new("a").cmd_id());
    }

    #[test]
    fn clone_excluding_skips_listed_fields() {
        let conn = ConnectionHandle::new("c");
        let mut cmd = Cmd::new("hello");
        cmd.set_seq_id("7");
        cmd.set_property("k", 1i64).unwrap();
        cmd.set_original_connection(conn.downgrade());

        let partial = cmd.clone_excluding(&[FieldId::Properties, FieldId::CmdId]);
        assert_eq!(partial.name(), "hello");
        assert_eq!(partial.seq_id(), Some("7"));
        assert_eq!(partial.cmd_id(), "");
        assert_eq!(partial.peek_property("k").unwrap(), None);
        assert!(partial.original_connection().is_some_and(|c| c.is_alive()));

        let full = cmd.clone_excluding(&[]);
        assert_eq!(full, cmd);
    }

    #[test]
    fn table_starts_with_type() {
        assert_eq!(Cmd::fields()[0].id, FieldId::Type);
    }
}
