//! Per-owner table of pending commands.
//!
//! IN paths remember commands this owner received and must answer; OUT paths
//! remember commands it sent and whose results it waits for. Each side holds
//! at most one path per command id.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use conflux_core::error::{ConfluxError, Result};
use conflux_core::msg::{new_cmd_id, Cmd, CmdResult, Loc, Msg, MsgType, StatusCode, WeakConnection};

use super::group::{PathGroup, ResultReturnPolicy};

/// Detail of the error result synthesized for an expired OUT path.
pub const PATH_TIMEOUT_DETAIL: &str = "Path timeout.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathTimeouts {
    pub in_path: Duration,
    pub out_path: Duration,
}

impl Default for PathTimeouts {
    fn default() -> Self {
        Self {
            in_path: Duration::from_secs(300),
            out_path: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
pub struct Path<H> {
    pub kind: PathKind,
    pub cmd_name: String,
    pub cmd_id: String,
    pub parent_cmd_id: Option<String>,
    /// The id the other side knows this command by; put back on results.
    pub original_cmd_id: String,
    pub src: Loc,
    pub dest: Loc,
    /// Client connection the command came from, if any.
    pub original_connection: Option<WeakConnection>,
    pub expires_at: Instant,
    handler: Option<H>,
    group: Option<u64>,
}

/// A result ready for delivery, with the handler registered for it.
#[derive(Debug)]
pub struct Resolved<H> {
    pub handler: Option<H>,
    pub result: CmdResult,
}

#[derive(Debug)]
pub struct PathTable<H> {
    owner: String,
    in_paths: HashMap<String, Path<H>>,
    out_paths: HashMap<String, Path<H>>,
    groups: HashMap<u64, PathGroup>,
    next_group: u64,
    timeouts: PathTimeouts,
}

/// Rewrite `result` so its recipient sees its own view of the command.
fn restore<H: Clone>(result: &mut CmdResult, path: &Path<H>) -> Option<H> {
    result.set_cmd_id(path.original_cmd_id.clone());
    result.set_dests(vec![path.src.clone()]);
    result.set_original_cmd(MsgType::Cmd, path.cmd_name.clone());
    if result.original_connection().is_none() {
        if let Some(conn) = &path.original_connection {
            result.set_original_connection(conn.clone());
        }
    }
    path.handler.clone()
}

impl<H: Clone> PathTable<H> {
    pub fn new(owner: impl Into<String>, timeouts: PathTimeouts) -> Self {
        Self {
            owner: owner.into(),
            in_paths: HashMap::new(),
            out_paths: HashMap::new(),
            groups: HashMap::new(),
            next_group: 1,
            timeouts,
        }
    }

    pub fn in_path_count(&self) -> usize {
        self.in_paths.len()
    }

    pub fn out_path_count(&self) -> usize {
        self.out_paths.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_paths.is_empty() && self.out_paths.is_empty()
    }

    pub fn out_path(&self, cmd_id: &str) -> Option<&Path<H>> {
        self.out_paths.get(cmd_id)
    }

    /// Record a received command.
    ///
    /// A command whose id is already pending here has looped back: its id
    /// moves to `parent_cmd_id` and it continues under a fresh one.
    pub fn add_in_path(&mut self, cmd: &mut Cmd) {
        let original = cmd.cmd_id().to_owned();
        if self.in_paths.contains_key(&original) {
            cmd.set_parent_cmd_id(Some(original.clone()));
            cmd.set_cmd_id(new_cmd_id());
            tracing::debug!(owner = %self.owner, cmd_id = %original, "command looped, re-identified");
        }
        let path = Path {
            kind: PathKind::In,
            cmd_name: cmd.name().to_owned(),
            cmd_id: cmd.cmd_id().to_owned(),
            parent_cmd_id: cmd.parent_cmd_id().map(str::to_owned),
            original_cmd_id: original,
            src: cmd.src().clone(),
            dest: cmd.dests().first().cloned().unwrap_or_default(),
            original_connection: cmd.original_connection().cloned(),
            expires_at: Instant::now() + self.timeouts.in_path,
            handler: None,
            group: None,
        };
        self.in_paths.insert(path.cmd_id.clone(), path);
    }

    fn out_path_for(&self, cmd: &Cmd, original: &str, dest: Loc, handler: Option<H>, group: Option<u64>) -> Path<H> {
        Path {
            kind: PathKind::Out,
            cmd_name: cmd.name().to_owned(),
            cmd_id: cmd.cmd_id().to_owned(),
            parent_cmd_id: cmd.parent_cmd_id().map(str::to_owned),
            original_cmd_id: original.to_owned(),
            src: cmd.src().clone(),
            dest,
            original_connection: cmd.original_connection().cloned(),
            expires_at: Instant::now() + self.timeouts.out_path,
            handler,
            group,
        }
    }

    /// Record an outgoing command and split it per destination.
    ///
    /// One destination keeps the command as is. N destinations produce N
    /// copies, each with its own id and one OUT path, linked in a group that
    /// folds their results according to `policy`.
    pub fn register_outgoing(
        &mut self,
        cmd: Cmd,
        handler: Option<H>,
        policy: ResultReturnPolicy,
    ) -> Result<Vec<Cmd>> {
        let dests = cmd.dests().to_vec();
        if dests.is_empty() {
            return Err(ConfluxError::InvalidArgument(format!(
                "cmd `{}` has no destination",
                cmd.name()
            )));
        }
        if self.out_paths.contains_key(cmd.cmd_id()) {
            return Err(ConfluxError::InvalidArgument(format!(
                "cmd id {} is already pending",
                cmd.cmd_id()
            )));
        }

        if let [dest] = dests.as_slice() {
            let path = self.out_path_for(&cmd, cmd.cmd_id(), dest.clone(), handler, None);
            self.out_paths.insert(path.cmd_id.clone(), path);
            return Ok(vec![cmd]);
        }

        let gid = self.next_group;
        self.next_group += 1;
        let original = cmd.cmd_id().to_owned();
        let mut copies = Vec::with_capacity(dests.len());
        let mut ids = Vec::with_capacity(dests.len());
        for dest in dests {
            let mut copy = cmd.clone();
            copy.set_cmd_id(new_cmd_id());
            copy.set_dests(vec![dest.clone()]);
            let path = self.out_path_for(&copy, &original, dest, handler.clone(), Some(gid));
            ids.push(path.cmd_id.clone());
            self.out_paths.insert(path.cmd_id.clone(), path);
            copies.push(copy);
        }
        self.groups.insert(gid, PathGroup::new(policy, ids));
        Ok(copies)
    }

    /// A result this owner is returning for a command it received.
    ///
    /// Addresses the result back to the command's source under the id the
    /// source knows. `None` when no such command is pending.
    pub fn resolve_in(&mut self, mut result: CmdResult) -> Option<CmdResult> {
        let key = result.cmd_id().to_owned();
        let Some(path) = self.in_paths.get(&key) else {
            tracing::warn!(owner = %self.owner, cmd_id = %key, "no pending command for returned result");
            return None;
        };
        restore(&mut result, path);
        if result.is_final() {
            self.in_paths.remove(&key);
        }
        Some(result)
    }

    /// A result arriving for a command this owner sent.
    ///
    /// Unknown ids are dropped and logged: the path may have timed out or its
    /// connection closed. Results of fanned-out commands are folded per
    /// group policy, so some arrivals produce nothing to deliver.
    pub fn resolve_out(&mut self, mut result: CmdResult) -> Option<Resolved<H>> {
        let id = result.cmd_id().to_owned();
        let Some(path) = self.out_paths.get(&id) else {
            tracing::warn!(owner = %self.owner, cmd_id = %id, "result for unknown command dropped");
            return None;
        };

        let Some(gid) = path.group else {
            let handler = restore(&mut result, path);
            let completed = result.is_final();
            if completed {
                self.out_paths.remove(&id);
            }
            result.set_completed(completed);
            return Some(Resolved { handler, result });
        };

        let handler = restore(&mut result, path);
        let Some(group) = self.groups.get_mut(&gid) else {
            tracing::warn!(owner = %self.owner, cmd_id = %id, "path group vanished");
            self.out_paths.remove(&id);
            return None;
        };

        match group.policy {
            ResultReturnPolicy::EachOkAndError => {
                if result.is_final() {
                    group.settle(&id);
                    self.out_paths.remove(&id);
                }
                let completed = group.is_settled();
                if completed {
                    self.groups.remove(&gid);
                }
                result.set_completed(completed);
                Some(Resolved { handler, result })
            }
            policy @ (ResultReturnPolicy::FirstErrorOrFirstOk
            | ResultReturnPolicy::FirstErrorOrLastOk) => {
                if !result.is_ok() {
                    for member in &group.members {
                        self.out_paths.remove(member);
                    }
                    self.groups.remove(&gid);
                    result.set_final(true);
                    result.set_completed(true);
                    return Some(Resolved { handler, result });
                }
                if !result.is_final() {
                    return None;
                }
                group.settle(&id);
                group.oks.push(result);
                if !group.is_settled() {
                    return None;
                }

                let group = self.groups.remove(&gid)?;
                for member in &group.members {
                    self.out_paths.remove(member);
                }
                let mut chosen = match policy {
                    ResultReturnPolicy::FirstErrorOrLastOk => group.oks.into_iter().last(),
                    _ => group.oks.into_iter().next(),
                }?;
                chosen.set_completed(true);
                Some(Resolved {
                    handler,
                    result: chosen,
                })
            }
        }
    }

    /// Forget OUT paths registered for commands that never left, together
    /// with their group. No result is synthesized and no handler runs.
    pub fn cancel_outgoing(&mut self, cmd_ids: &[String]) {
        for id in cmd_ids {
            if let Some(gid) = self.out_paths.remove(id).and_then(|p| p.group) {
                if let Some(group) = self.groups.remove(&gid) {
                    for member in &group.members {
                        self.out_paths.remove(member);
                    }
                }
            }
        }
    }

    /// Tear the table down, synthesizing one error result per pending OUT
    /// path so every sent command resolves. IN paths are simply dropped.
    pub fn flush_with_error(&mut self, detail: &str) -> Vec<Resolved<H>> {
        self.in_paths.clear();
        let mut ids: Vec<String> = self.out_paths.keys().cloned().collect();
        ids.sort();
        let resolved = self.fail_paths(ids, detail);
        self.groups.clear();
        resolved
    }

    /// Answer every command still pending on the IN side with an error,
    /// each addressed back to its sender.
    pub fn fail_in_paths(&mut self, detail: &str) -> Vec<CmdResult> {
        let mut paths: Vec<Path<H>> = self.in_paths.drain().map(|(_, p)| p).collect();
        paths.sort_by(|a, b| a.cmd_id.cmp(&b.cmd_id));
        paths
            .iter()
            .map(|path| {
                let mut r = CmdResult::new(StatusCode::Error);
                r.set_detail(detail);
                restore(&mut r, path);
                r
            })
            .collect()
    }

    /// Drop expired IN paths and fail expired OUT paths with
    /// [`PATH_TIMEOUT_DETAIL`].
    pub fn take_expired(&mut self, now: Instant) -> Vec<Resolved<H>> {
        let before = self.in_paths.len();
        self.in_paths.retain(|_, p| p.expires_at > now);
        let dropped_in = before - self.in_paths.len();

        let mut ids: Vec<String> = self
            .out_paths
            .values()
            .filter(|p| p.expires_at <= now)
            .map(|p| p.cmd_id.clone())
            .collect();
        if ids.is_empty() && dropped_in == 0 {
            return Vec::new();
        }
        ids.sort();
        tracing::warn!(owner = %self.owner, outbound = ids.len(), inbound = dropped_in, "paths timed out");
        self.fail_paths(ids, PATH_TIMEOUT_DETAIL)
    }

    fn fail_paths(&mut self, ids: Vec<String>, detail: &str) -> Vec<Resolved<H>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            // an earlier error may already have retired the whole group
            if !self.out_paths.contains_key(&id) {
                continue;
            }
            let mut r = CmdResult::new(StatusCode::Error);
            r.set_cmd_id(id);
            r.set_detail(detail);
            out.extend(self.resolve_out(r));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PathTable<u32> {
        PathTable::new("a", PathTimeouts::default())
    }

    fn cmd_to(dests: &[&str]) -> Cmd {
        let mut cmd = Cmd::new("hello");
        cmd.set_src(Loc::extension("a"));
        cmd.set_dests(dests.iter().map(|d| Loc::extension(*d)).collect());
        cmd
    }

    fn ok(id: &str) -> CmdResult {
        let mut r = CmdResult::new(StatusCode::Ok);
        r.set_cmd_id(id);
        r
    }

    #[test]
    fn single_destination_keeps_id_and_retires_on_final() {
        let mut t = table();
        let cmd = cmd_to(&["b"]);
        let id = cmd.cmd_id().to_owned();
        let sent = t.register_outgoing(cmd, Some(7), ResultReturnPolicy::default()).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].cmd_id(), id);

        let mut partial = ok(&id);
        partial.set_final(false);
        let r = t.resolve_out(partial).unwrap();
        assert_eq!(r.handler, Some(7));
        assert!(!r.result.is_completed());
        assert_eq!(t.out_path_count(), 1);

        let r = t.resolve_out(ok(&id)).unwrap();
        assert!(r.result.is_completed());
        assert_eq!(r.result.original_cmd_name(), Some("hello"));
        assert_eq!(r.result.dests(), &[Loc::extension("a")]);
        assert!(t.is_empty());
    }

    #[test]
    fn fan_out_delivers_each_and_completes_on_last() {
        let mut t = table();
        let cmd = cmd_to(&["b", "c", "d"]);
        let original = cmd.cmd_id().to_owned();
        let sent = t.register_outgoing(cmd, Some(1), ResultReturnPolicy::EachOkAndError).unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|c| c.cmd_id() != original && c.dests().len() == 1));

        let mut delivered = Vec::new();
        for c in sent.iter().rev() {
            delivered.extend(t.resolve_out(ok(c.cmd_id())));
        }
        assert_eq!(delivered.len(), 3);
        assert!(delivered.iter().all(|r| r.result.cmd_id() == original));
        let completed: Vec<bool> = delivered.iter().map(|r| r.result.is_completed()).collect();
        assert_eq!(completed, vec![false, false, true]);
        assert!(t.is_empty());
        assert_eq!(t.group_count(), 0);
    }

    #[test]
    fn orphan_result_leaves_other_paths_alone() {
        let mut t = table();
        let sent = t.register_outgoing(cmd_to(&["b"]), Some(1), ResultReturnPolicy::default()).unwrap();
        assert!(t.resolve_out(ok("no-such-id")).is_none());
        assert_eq!(t.out_path_count(), 1);
        assert!(t.resolve_out(ok(sent[0].cmd_id())).is_some());
    }

    #[test]
    fn first_error_wins_and_retires_group() {
        let mut t = table();
        let sent = t
            .register_outgoing(cmd_to(&["b", "c"]), Some(1), ResultReturnPolicy::FirstErrorOrFirstOk)
            .unwrap();
        assert!(t.resolve_out(ok(sent[0].cmd_id())).is_none());

        let mut err = CmdResult::new(StatusCode::Error);
        err.set_cmd_id(sent[1].cmd_id());
        let r = t.resolve_out(err).unwrap();
        assert!(!r.result.is_ok());
        assert!(r.result.is_completed());
        assert!(t.is_empty());
    }

    #[test]
    fn last_ok_policy_waits_for_every_destination() {
        let mut t = table();
        let sent = t
            .register_outgoing(cmd_to(&["b", "c"]), Some(1), ResultReturnPolicy::FirstErrorOrLastOk)
            .unwrap();
        let mut first = ok(sent[1].cmd_id());
        first.set_property("from", "c").unwrap();
        let mut last = ok(sent[0].cmd_id());
        last.set_property("from", "b").unwrap();

        assert!(t.resolve_out(first).is_none());
        let r = t.resolve_out(last).unwrap();
        assert_eq!(r.result.peek_property("from").unwrap(), Some("b".into()));
        assert!(r.result.is_completed());
        assert!(t.is_empty());
    }

    #[test]
    fn flush_fails_every_pending_command() {
        let mut t = table();
        for _ in 0..5 {
            t.register_outgoing(cmd_to(&["b"]), Some(3), ResultReturnPolicy::default()).unwrap();
        }
        let mut incoming = cmd_to(&["a"]);
        t.add_in_path(&mut incoming);
        let answered = t.fail_in_paths("closed");
        assert_eq!(answered.len(), 1);
        assert_eq!(answered[0].cmd_id(), incoming.cmd_id());
        assert_eq!(answered[0].dests(), &[Loc::extension("a")]);

        let flushed = t.flush_with_error("closed");
        assert_eq!(flushed.len(), 5);
        assert!(flushed.iter().all(|r| !r.result.is_ok() && r.handler == Some(3)));
        assert!(t.is_empty());
    }

    #[test]
    fn cancelled_commands_leave_no_paths_behind() {
        let mut t = table();
        let single = t.register_outgoing(cmd_to(&["b"]), Some(1), ResultReturnPolicy::default()).unwrap();
        let fanned = t
            .register_outgoing(cmd_to(&["b", "c", "d"]), Some(2), ResultReturnPolicy::default())
            .unwrap();
        assert_eq!(t.out_path_count(), 4);

        let ids: Vec<String> = single.iter().chain(&fanned[..1]).map(|c| c.cmd_id().to_owned()).collect();
        t.cancel_outgoing(&ids);
        assert_eq!(t.out_path_count(), 0);
        assert_eq!(t.group_count(), 0);
        assert!(t.flush_with_error("closed").is_empty());
        assert!(t.resolve_out(ok(fanned[2].cmd_id())).is_none());
    }

    #[test]
    fn looped_command_gets_a_new_id_and_answers_under_the_old_one() {
        let mut t = table();
        let mut first = cmd_to(&["a"]);
        t.add_in_path(&mut first);
        let mut looped = first.clone();
        t.add_in_path(&mut looped);
        assert_ne!(looped.cmd_id(), first.cmd_id());
        assert_eq!(looped.parent_cmd_id(), Some(first.cmd_id()));

        let r = t.resolve_in(CmdResult::for_cmd(StatusCode::Ok, &looped)).unwrap();
        assert_eq!(r.cmd_id(), first.cmd_id());
        assert_eq!(t.in_path_count(), 1);
    }

    #[test]
    fn expired_out_paths_fail_with_timeout() {
        let mut t = PathTable::<u32>::new(
            "a",
            PathTimeouts {
                in_path: Duration::ZERO,
                out_path: Duration::ZERO,
            },
        );
        let mut incoming = cmd_to(&["a"]);
        t.add_in_path(&mut incoming);
        t.register_outgoing(cmd_to(&["b"]), Some(1), ResultReturnPolicy::default()).unwrap();

        let expired = t.take_expired(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(
            expired[0].result.detail(),
            Some(&conflux_core::Value::from(PATH_TIMEOUT_DETAIL))
        );
        assert!(t.is_empty());
    }
}
