//! The run loop of one extension group.
//!
//! Each group gets an OS thread with a single-threaded tokio runtime. All
//! callbacks of the group and its extensions run here, strictly in the
//! order their tasks were posted. Other threads only ever post tasks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use conflux_core::error::{ConfluxError, Result};
use conflux_core::msg::{CmdResult, Loc, Message, Msg, MsgType, SharedMsg};

use crate::addon::{AddonInstance, AddonKind, AddonStore};
use crate::engine::EngineSender;
use crate::graph::Graph;
use crate::lifecycle::{LifecycleState, Phase};
use crate::path::{PathTimeouts, Resolved};

use super::env::{ExtensionCore, ExtensionEnv};
use super::group::{ExtensionGroupEnv, GroupCore};
use super::proxy::{Ack, NotifyJob};
use super::{Extension, ExtensionGroup, ResultHandler};

pub(crate) type ThreadSender = mpsc::UnboundedSender<ThreadTask>;

pub(crate) enum ThreadTask {
    Deliver {
        target: String,
        msg: SharedMsg,
    },
    Notify {
        target: String,
        job: NotifyJob,
        ack: Option<Ack>,
    },
    /// The extension acknowledged a phase; begin the next one.
    Advance {
        target: String,
    },
    GroupCreated(Result<AddonInstance>),
    GroupAdvance,
    ExtensionCreated {
        name: String,
        result: Result<AddonInstance>,
    },
    ProxyReleased {
        target: String,
    },
    /// Tear the extension down after a broken contract.
    Fail {
        target: String,
        reason: String,
    },
    FailGroup {
        reason: String,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

/// Read-only context shared by every env created on this thread.
pub(crate) struct ThreadCtx {
    pub group: String,
    pub owner: ThreadId,
    pub tx: ThreadSender,
    pub engine: EngineSender,
    pub graph: Arc<Graph>,
    pub store: AddonStore,
    pub phase_timeout: Duration,
    pub path_timeouts: PathTimeouts,
}

impl ThreadCtx {
    pub fn post(&self, task: ThreadTask) {
        // only fails once the loop is gone, when nothing is left to advance
        let _ = self.tx.send(task);
    }

    fn route(&self, msg: SharedMsg) {
        if let Err(e) = self.engine.route(msg) {
            tracing::warn!(group = %self.group, error = %e, "message not routed");
        }
    }
}

pub(crate) struct ThreadConfig {
    pub group: String,
    pub group_addon: String,
    pub engine: EngineSender,
    pub graph: Arc<Graph>,
    pub store: AddonStore,
    pub phase_timeout: Duration,
    pub path_timeouts: PathTimeouts,
    pub path_check_interval: Duration,
}

/// Engine-side handle of a running group thread.
pub(crate) struct ExtensionThreadHandle {
    group: String,
    tx: ThreadSender,
    join: Option<JoinHandle<()>>,
}

impl ExtensionThreadHandle {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn sender(&self) -> ThreadSender {
        self.tx.clone()
    }

    /// Stop and deinit everything on the thread, then wait for it to exit.
    /// Gives up waiting after `bound`.
    pub async fn close(mut self, bound: Duration) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(ThreadTask::Close { done: done_tx }).is_err() {
            tracing::debug!(group = %self.group, "thread already gone");
        } else if tokio::time::timeout(bound, done_rx).await.is_err() {
            tracing::error!(group = %self.group, ?bound, "extension thread did not close in time, detaching");
            return;
        }
        if let Some(join) = self.join.take() {
            let group = self.group.clone();
            let joined = tokio::task::spawn_blocking(move || join.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                tracing::error!(%group, "extension thread ended abnormally");
            }
        }
    }
}

pub(crate) fn spawn(cfg: ThreadConfig, ready: oneshot::Sender<()>) -> Result<ExtensionThreadHandle> {
    let (tx, rx) = mpsc::unbounded_channel();
    let group = cfg.group.clone();
    let loop_tx = tx.clone();

    let join = thread::Builder::new()
        .name(format!("conflux-ext-{group}"))
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!(group = %cfg.group, error = %e, "extension thread runtime failed");
                    return;
                }
            };
            rt.block_on(GroupLoop::new(cfg, loop_tx, ready).run(rx));
        })
        .map_err(|e| ConfluxError::Internal(format!("spawn thread for group `{group}`: {e}")))?;

    Ok(ExtensionThreadHandle {
        group,
        tx,
        join: Some(join),
    })
}

struct Slot {
    core: ExtensionCore,
    addon: String,
    ext: Box<dyn Extension>,
    /// Messages that arrived before the extension started.
    queued: VecDeque<SharedMsg>,
}

struct GroupLoop {
    ctx: ThreadCtx,
    group_addon: String,
    group: Option<Box<dyn ExtensionGroup>>,
    gcore: GroupCore,
    slots: Vec<Slot>,
    /// Messages for extensions whose instance is still being created.
    early: HashMap<String, VecDeque<SharedMsg>>,
    /// Extensions of this group that failed or were destroyed.
    gone: HashSet<String>,
    ready: Option<oneshot::Sender<()>>,
    close_ack: Option<oneshot::Sender<()>>,
    closing: bool,
    finished: bool,
    tick: Duration,
}

impl GroupLoop {
    fn new(cfg: ThreadConfig, tx: ThreadSender, ready: oneshot::Sender<()>) -> Self {
        let tick = cfg.path_check_interval.min(cfg.phase_timeout / 4).max(Duration::from_millis(1));
        let gcore = GroupCore::new(&cfg.group);
        Self {
            ctx: ThreadCtx {
                group: cfg.group,
                owner: thread::current().id(),
                tx,
                engine: cfg.engine,
                graph: cfg.graph,
                store: cfg.store,
                phase_timeout: cfg.phase_timeout,
                path_timeouts: cfg.path_timeouts,
            },
            group_addon: cfg.group_addon,
            group: None,
            gcore,
            slots: Vec::new(),
            early: HashMap::new(),
            gone: HashSet::new(),
            ready: Some(ready),
            close_ack: None,
            closing: false,
            finished: false,
            tick,
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ThreadTask>) {
        tracing::info!(group = %self.ctx.group, "extension thread started");
        self.create_group();

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while !self.finished {
            tokio::select! {
                task = rx.recv() => match task {
                    Some(task) => self.handle(task),
                    None => break,
                },
                _ = ticker.tick() => self.on_tick(),
            }
        }
        tracing::info!(group = %self.ctx.group, "extension thread stopped");
    }

    fn handle(&mut self, task: ThreadTask) {
        match task {
            ThreadTask::Deliver { target, msg } => self.deliver(&target, msg),
            ThreadTask::Notify { target, job, ack } => self.run_job(&target, job, ack),
            ThreadTask::Advance { target } => self.advance(&target),
            ThreadTask::GroupCreated(result) => self.on_group_created(result),
            ThreadTask::GroupAdvance => self.advance_group(),
            ThreadTask::ExtensionCreated { name, result } => self.on_extension_created(name, result),
            ThreadTask::ProxyReleased { target } => {
                if let Some(i) = self.slot_index(&target) {
                    if let Err(e) = self.slots[i].core.complete_deferred_deinit(&self.ctx) {
                        self.fail_extension(i, &e.to_string());
                    }
                }
            }
            ThreadTask::Fail { target, reason } => {
                if let Some(i) = self.slot_index(&target) {
                    self.fail_extension(i, &reason);
                }
            }
            ThreadTask::FailGroup { reason } => {
                if self.gcore.lifecycle.state() != LifecycleState::Destroyed {
                    self.fail_group(&reason);
                }
            }
            ThreadTask::Close { done } => {
                self.close_ack = Some(done);
                self.begin_close();
            }
        }
    }

    fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.core.name == name)
    }

    /// Run `f` against extension `i` and its env. A panic, or an env that
    /// cannot be handed out, fails the extension instead of the thread.
    fn call<F>(&mut self, i: usize, what: &str, f: F)
    where
        F: FnOnce(&mut dyn Extension, &mut ExtensionEnv<'_>),
    {
        let failure = {
            let ctx = &self.ctx;
            let Some(slot) = self.slots.get_mut(i) else {
                return;
            };
            match ExtensionEnv::new(&mut slot.core, ctx) {
                Ok(mut env) => {
                    let ext = slot.ext.as_mut();
                    panic::catch_unwind(AssertUnwindSafe(|| f(ext, &mut env)))
                        .err()
                        .map(|_| format!("panicked in {what}"))
                }
                Err(e) => Some(format!("env unavailable for {what}: {e}")),
            }
        };
        if let Some(reason) = failure {
            self.fail_extension(i, &reason);
        }
    }

    fn call_group<F>(&mut self, what: &str, f: F)
    where
        F: FnOnce(&mut dyn ExtensionGroup, &mut ExtensionGroupEnv<'_>),
    {
        let failure = {
            let Some(group) = self.group.as_mut() else {
                return;
            };
            match ExtensionGroupEnv::new(&mut self.gcore, &self.ctx) {
                Ok(mut env) => panic::catch_unwind(AssertUnwindSafe(|| f(group.as_mut(), &mut env)))
                    .err()
                    .map(|_| format!("panicked in {what}")),
                Err(e) => Some(format!("group env unavailable for {what}: {e}")),
            }
        };
        if let Some(reason) = failure {
            self.fail_group(&reason);
        }
    }

    // ---- group ----

    fn create_group(&mut self) {
        // the addon gets one phase worth of time to hand over the instance
        self.gcore.deadline = Some((Phase::Configure, Instant::now() + self.ctx.phase_timeout));
        let tx = self.ctx.tx.clone();
        let requested = self.ctx.store.create_instance(
            AddonKind::ExtensionGroup,
            &self.group_addon,
            &self.ctx.group,
            Box::new(move |result| {
                let _ = tx.send(ThreadTask::GroupCreated(result));
            }),
        );
        if let Err(e) = requested {
            self.fail_group(&e.to_string());
        }
    }

    fn on_group_created(&mut self, result: Result<AddonInstance>) {
        match result {
            Ok(AddonInstance::ExtensionGroup(group)) if !self.closing => {
                self.group = Some(group);
                self.begin_group(Phase::Configure);
            }
            Ok(other) => {
                self.give_back(AddonKind::ExtensionGroup, &self.group_addon, other);
                if self.closing {
                    self.finish();
                } else {
                    self.fail_group("addon did not produce an extension group");
                }
            }
            Err(e) => self.fail_group(&e.to_string()),
        }
    }

    fn begin_group(&mut self, phase: Phase) {
        if let Err(e) = self.gcore.begin(phase, &self.ctx) {
            self.fail_group(&e.to_string());
            return;
        }
        match phase {
            Phase::Configure => self.call_group("on_configure", |g, env| g.on_configure(env)),
            Phase::Init => self.call_group("on_init", |g, env| g.on_init(env)),
            Phase::Start => {
                self.call_group("on_create_extensions", |g, env| g.on_create_extensions(env));
                self.maybe_group_started();
            }
            Phase::Stop => {
                // extensions are all gone by now
                if let Err(e) = self.gcore.complete(Phase::Stop, &self.ctx) {
                    self.fail_group(&e.to_string());
                }
            }
            Phase::Deinit => self.call_group("on_deinit", |g, env| g.on_deinit(env)),
        }
    }

    fn advance_group(&mut self) {
        match self.gcore.lifecycle.state() {
            LifecycleState::Configured if self.closing => self.finish(),
            LifecycleState::Configured => self.begin_group(Phase::Init),
            LifecycleState::Initted if self.closing => self.finish(),
            LifecycleState::Initted => self.begin_group(Phase::Start),
            LifecycleState::Started => {
                self.check_ready();
                self.check_closed();
            }
            LifecycleState::Stopped => self.begin_group(Phase::Deinit),
            LifecycleState::Deinitted => {
                let _ = self.gcore.lifecycle.destroy();
                self.finish();
            }
            _ => {}
        }
    }

    fn maybe_group_started(&mut self) {
        if self.gcore.lifecycle.state() == LifecycleState::Starting
            && self.gcore.settled == self.gcore.requested
        {
            if let Err(e) = self.gcore.complete(Phase::Start, &self.ctx) {
                self.fail_group(&e.to_string());
            }
        }
    }

    /// The group cannot run: none of its extensions will exist.
    fn fail_group(&mut self, reason: &str) {
        tracing::error!(group = %self.ctx.group, %reason, "extension group failed");
        self.gcore.lifecycle.force_destroy();
        self.gcore.deadline = None;
        while !self.slots.is_empty() {
            self.fail_extension(0, "extension group failed");
        }
        let nodes: Vec<String> = self
            .ctx
            .graph
            .nodes_in_group(&self.ctx.group)
            .map(|n| n.name.clone())
            .collect();
        for name in nodes {
            self.gone.insert(name.clone());
            self.reject_early(&name);
            self.ctx.engine.extension_failed(&name, reason);
        }
        self.check_ready();
        if self.closing {
            self.finish();
        }
    }

    // ---- extensions ----

    fn on_extension_created(&mut self, name: String, result: Result<AddonInstance>) {
        self.gcore.settled += 1;
        let addon = self
            .ctx
            .graph
            .node(&name)
            .map(|n| n.addon.clone())
            .unwrap_or_default();

        match result {
            Ok(AddonInstance::Extension(ext)) if !self.closing && self.gcore.lifecycle.state() == LifecycleState::Starting => {
                let Some(node) = self.ctx.graph.node(&name).cloned() else {
                    self.give_back(AddonKind::Extension, &addon, AddonInstance::Extension(ext));
                    return;
                };
                let core = ExtensionCore::new(&name, node.loc, node.property, &self.ctx);
                let queued = self.early.remove(&name).unwrap_or_default();
                self.slots.push(Slot {
                    core,
                    addon,
                    ext,
                    queued,
                });
                tracing::debug!(group = %self.ctx.group, extension = %name, "extension created");
                let i = self.slots.len() - 1;
                self.begin_phase(i, Phase::Configure);
            }
            Ok(other) => {
                self.give_back(AddonKind::Extension, &addon, other);
                self.gone.insert(name.clone());
                self.reject_early(&name);
                if !self.closing {
                    self.ctx.engine.extension_failed(&name, "instance not accepted by its group");
                }
            }
            Err(e) => {
                tracing::error!(group = %self.ctx.group, extension = %name, error = %e, "extension creation failed");
                self.gone.insert(name.clone());
                self.reject_early(&name);
                self.ctx.engine.extension_failed(&name, &e.to_string());
            }
        }
        self.maybe_group_started();
        self.check_closed();
    }

    fn begin_phase(&mut self, i: usize, phase: Phase) {
        if let Err(e) = self.slots[i].core.begin(phase, &self.ctx) {
            self.fail_extension(i, &e.to_string());
            return;
        }
        match phase {
            Phase::Configure => self.call(i, "on_configure", |ext, env| ext.on_configure(env)),
            Phase::Init => self.call(i, "on_init", |ext, env| ext.on_init(env)),
            Phase::Start => self.call(i, "on_start", |ext, env| ext.on_start(env)),
            Phase::Stop => self.call(i, "on_stop", |ext, env| ext.on_stop(env)),
            Phase::Deinit => self.call(i, "on_deinit", |ext, env| ext.on_deinit(env)),
        }
    }

    fn advance(&mut self, target: &str) {
        let Some(i) = self.slot_index(target) else {
            return;
        };
        match self.slots[i].core.lifecycle.state() {
            LifecycleState::Configured => self.begin_phase(i, Phase::Init),
            LifecycleState::Initted => self.begin_phase(i, Phase::Start),
            LifecycleState::Started if self.closing => self.begin_phase(i, Phase::Stop),
            LifecycleState::Started => {
                self.flush_queued(target);
                self.check_ready();
            }
            LifecycleState::Stopped => self.begin_phase(i, Phase::Deinit),
            LifecycleState::Deinitted => self.destroy_extension(i),
            _ => {}
        }
    }

    fn flush_queued(&mut self, target: &str) {
        loop {
            // re-resolve each time: a callback may fail the extension
            let Some(i) = self.slot_index(target) else {
                return;
            };
            if self.slots[i].core.lifecycle.state() != LifecycleState::Started {
                return;
            }
            let Some(msg) = self.slots[i].queued.pop_front() else {
                return;
            };
            self.deliver_now(i, msg);
        }
    }

    fn deliver(&mut self, target: &str, msg: SharedMsg) {
        let Some(i) = self.slot_index(target) else {
            let expected = !self.closing
                && !self.gone.contains(target)
                && self.gcore.lifecycle.state() <= LifecycleState::Starting
                && self.ctx.graph.node(target).is_some_and(|n| n.group == self.ctx.group);
            if expected {
                self.early.entry(target.to_owned()).or_default().push_back(msg);
            } else {
                self.undeliverable(target, msg, "extension not found");
            }
            return;
        };

        let state = self.slots[i].core.lifecycle.state();
        if msg.msg_type() == MsgType::CmdResult {
            self.deliver_now(i, msg);
        } else if state < LifecycleState::Started {
            self.slots[i].queued.push_back(msg);
        } else if state == LifecycleState::Started {
            self.deliver_now(i, msg);
        } else {
            self.undeliverable(target, msg, "extension is stopping");
        }
    }

    fn deliver_now(&mut self, i: usize, msg: SharedMsg) {
        match msg.into_message() {
            Message::Cmd(mut cmd) => {
                self.slots[i].core.paths.add_in_path(&mut cmd);
                self.call(i, "on_cmd", move |ext, env| ext.on_cmd(env, cmd));
            }
            Message::CmdResult(result) => {
                if let Some(resolved) = self.slots[i].core.paths.resolve_out(result) {
                    self.run_handler(i, resolved);
                }
            }
            Message::Data(data) => self.call(i, "on_data", move |ext, env| ext.on_data(env, data)),
            Message::AudioFrame(frame) => {
                self.call(i, "on_audio_frame", move |ext, env| ext.on_audio_frame(env, frame))
            }
            Message::VideoFrame(frame) => {
                self.call(i, "on_video_frame", move |ext, env| ext.on_video_frame(env, frame))
            }
        }
    }

    fn run_handler(&mut self, i: usize, resolved: Resolved<ResultHandler>) {
        let Resolved { handler, result } = resolved;
        if let Some(handler) = handler {
            self.call(i, "result handler", move |_, env| handler(env, result));
        }
    }

    /// Nobody will handle `msg` at `target`: commands are answered with an
    /// error so their sender does not wait, anything else is dropped.
    fn undeliverable(&self, target: &str, msg: SharedMsg, why: &str) {
        match &*msg {
            Message::Cmd(cmd) => {
                let mut result = CmdResult::error_for(cmd, format!("{why}: {target}"));
                result.set_src(self.ctx.graph.complete_loc(&Loc::extension(target)));
                result.set_dests(vec![cmd.src().clone()]);
                self.ctx.route(SharedMsg::share(result));
            }
            other => {
                tracing::warn!(group = %self.ctx.group, extension = %target, msg_type = %other.msg_type(), name = %other.name(), %why, "message dropped");
            }
        }
    }

    fn reject_early(&mut self, name: &str) {
        for msg in self.early.remove(name).unwrap_or_default() {
            self.undeliverable(name, msg, "extension failed to start");
        }
    }

    fn run_job(&mut self, target: &str, job: NotifyJob, ack: Option<Ack>) {
        let Some(i) = self.slot_index(target) else {
            tracing::warn!(group = %self.ctx.group, extension = %target, "notify target gone, job dropped");
            return;
        };
        self.call(i, "notify job", move |_, env| job(env));
        if let Some(ack) = ack {
            ack.send();
        }
    }

    /// Answer and abandon everything the extension still has pending.
    fn settle_paths(&self, core: &mut ExtensionCore, detail: &str) {
        for mut result in core.paths.fail_in_paths(detail) {
            result.set_src(core.loc.clone());
            self.ctx.route(SharedMsg::share(result));
        }
        let dropped = core.paths.flush_with_error(detail).len();
        if dropped > 0 {
            tracing::debug!(extension = %core.name, dropped, "results of outstanding commands discarded");
        }
    }

    fn destroy_extension(&mut self, i: usize) {
        let mut slot = self.slots.remove(i);
        self.gone.insert(slot.core.name.clone());
        if let Err(e) = slot.core.lifecycle.destroy() {
            tracing::error!(extension = %slot.core.name, error = %e, "destroy out of order");
        }
        self.settle_paths(&mut slot.core, "extension closed");
        for msg in std::mem::take(&mut slot.queued) {
            self.undeliverable(&slot.core.name, msg, "extension closed");
        }
        tracing::info!(group = %self.ctx.group, extension = %slot.core.name, "extension destroyed");
        self.give_back(AddonKind::Extension, &slot.addon, AddonInstance::Extension(slot.ext));
        self.check_closed();
    }

    /// Terminal failure of one extension: it is torn down without further
    /// callbacks and the engine stops routing to it.
    fn fail_extension(&mut self, i: usize, reason: &str) {
        if i >= self.slots.len() {
            return;
        }
        let mut slot = self.slots.remove(i);
        self.gone.insert(slot.core.name.clone());
        tracing::error!(group = %self.ctx.group, extension = %slot.core.name, state = %slot.core.lifecycle.state(), %reason, "extension failed");
        slot.core.lifecycle.force_destroy();
        self.settle_paths(&mut slot.core, reason);
        for msg in std::mem::take(&mut slot.queued) {
            self.undeliverable(&slot.core.name, msg, "extension failed");
        }
        self.ctx.engine.extension_failed(&slot.core.name, reason);
        self.give_back(AddonKind::Extension, &slot.addon, AddonInstance::Extension(slot.ext));
        self.check_ready();
        self.check_closed();
    }

    fn give_back(&self, kind: AddonKind, addon: &str, instance: AddonInstance) {
        match self.ctx.store.find(kind, addon) {
            Some(host) => host.destroy_instance(instance),
            None => drop(instance),
        }
    }

    // ---- readiness and teardown ----

    fn check_ready(&mut self) {
        if self.ready.is_none() {
            return;
        }
        let group_state = self.gcore.lifecycle.state();
        let group_done = group_state == LifecycleState::Started || group_state == LifecycleState::Destroyed;
        let all_started = self
            .slots
            .iter()
            .all(|s| s.core.lifecycle.state() >= LifecycleState::Started);
        if group_done && all_started {
            if let Some(ready) = self.ready.take() {
                let _ = ready.send(());
            }
        }
    }

    fn begin_close(&mut self) {
        if self.closing {
            return;
        }
        self.closing = true;
        tracing::info!(group = %self.ctx.group, extensions = self.slots.len(), "closing extension thread");
        let started: Vec<String> = self
            .slots
            .iter()
            .filter(|s| s.core.lifecycle.state() == LifecycleState::Started)
            .map(|s| s.core.name.clone())
            .collect();
        for name in started {
            if let Some(i) = self.slot_index(&name) {
                self.begin_phase(i, Phase::Stop);
            }
        }
        let early: Vec<String> = self.early.keys().cloned().collect();
        for name in early {
            self.reject_early(&name);
        }
        self.check_closed();
    }

    /// Once every extension is gone and no creation is outstanding, take the
    /// group down.
    fn check_closed(&mut self) {
        if !self.closing || self.finished || !self.slots.is_empty() {
            return;
        }
        if self.gcore.settled < self.gcore.requested {
            return;
        }
        match self.gcore.lifecycle.state() {
            LifecycleState::Started => self.begin_group(Phase::Stop),
            LifecycleState::Starting => {
                // every creation settled; complete start, stop follows
                self.maybe_group_started();
            }
            LifecycleState::Destroyed => self.finish(),
            // group creation, configure or init still running; their
            // completion sees `closing` and finishes
            _ => {}
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        if self.gcore.lifecycle.state() != LifecycleState::Destroyed {
            self.gcore.lifecycle.force_destroy();
        }
        if let Some(group) = self.group.take() {
            let addon = self.group_addon.clone();
            self.give_back(AddonKind::ExtensionGroup, &addon, AddonInstance::ExtensionGroup(group));
        }
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(());
        }
        if let Some(ack) = self.close_ack.take() {
            let _ = ack.send(());
        }
        self.finished = true;
    }

    fn on_tick(&mut self) {
        let now = Instant::now();

        if let Some((phase, deadline)) = self.gcore.deadline {
            if deadline <= now {
                self.fail_group(&format!("{phase} not acknowledged within {:?}", self.ctx.phase_timeout));
            }
        }

        let overdue: Vec<(String, Phase)> = self
            .slots
            .iter()
            .filter_map(|s| match s.core.deadline {
                Some((phase, deadline)) if deadline <= now => Some((s.core.name.clone(), phase)),
                _ => None,
            })
            .collect();
        for (name, phase) in overdue {
            if let Some(i) = self.slot_index(&name) {
                let reason = format!("{phase} not acknowledged within {:?}", self.ctx.phase_timeout);
                self.fail_extension(i, &reason);
            }
        }

        let names: Vec<String> = self.slots.iter().map(|s| s.core.name.clone()).collect();
        for name in names {
            let Some(i) = self.slot_index(&name) else {
                continue;
            };
            for resolved in self.slots[i].core.paths.take_expired(now) {
                let Some(i) = self.slot_index(&name) else {
                    break;
                };
                self.run_handler(i, resolved);
            }
        }
    }
}
