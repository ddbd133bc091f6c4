//! Fan-out groups: the OUT paths created when one command goes to several
//! destinations, and how their results are folded back.

use serde::Deserialize;

use conflux_core::msg::CmdResult;

/// How results of a fanned-out command reach the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultReturnPolicy {
    /// Deliver every result as it arrives; the last final one is marked
    /// completed.
    #[default]
    EachOkAndError,
    /// Deliver the first error at once; otherwise, once every destination
    /// answered OK, deliver the first OK.
    FirstErrorOrFirstOk,
    /// Same as above but deliver the last OK.
    FirstErrorOrLastOk,
}

#[derive(Debug)]
pub(crate) struct PathGroup {
    pub policy: ResultReturnPolicy,
    /// cmd ids still waiting for a final result
    pub outstanding: Vec<String>,
    /// cmd ids of the whole group, for teardown
    pub members: Vec<String>,
    /// OK results in arrival order (first/last-OK policies only)
    pub oks: Vec<CmdResult>,
}

impl PathGroup {
    pub fn new(policy: ResultReturnPolicy, members: Vec<String>) -> Self {
        Self {
            policy,
            outstanding: members.clone(),
            members,
            oks: Vec::new(),
        }
    }

    pub fn settle(&mut self, cmd_id: &str) {
        self.outstanding.retain(|id| id != cmd_id);
    }

    pub fn is_settled(&self) -> bool {
        self.outstanding.is_empty()
    }
}
