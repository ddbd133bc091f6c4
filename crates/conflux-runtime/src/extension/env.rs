//! The handle an extension uses to talk to the runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use conflux_core::error::{ConfluxError, Result};
use conflux_core::msg::{
    AudioFrame, Cmd, CmdResult, Data, Loc, Message, Msg, SharedMsg, VideoFrame,
};
use conflux_core::value::Value;

use crate::lifecycle::{Lifecycle, LifecycleState, Phase};
use crate::path::{PathTable, ResultReturnPolicy};
use crate::thread_token::ThreadToken;

use super::proxy::EnvProxy;
use super::thread::{ThreadCtx, ThreadTask};
use super::ResultHandler;

/// Runtime-side state of one extension, owned by its group's thread.
pub(crate) struct ExtensionCore {
    pub name: String,
    pub loc: Loc,
    pub lifecycle: Lifecycle,
    pub property: Value,
    pub paths: PathTable<ResultHandler>,
    pub proxies: Arc<AtomicUsize>,
    /// `on_deinit_done` arrived while proxies were still alive.
    pub deinit_deferred: bool,
    /// Phase awaiting acknowledgment and its deadline.
    pub deadline: Option<(Phase, Instant)>,
}

impl ExtensionCore {
    pub fn new(name: &str, loc: Loc, property: Value, ctx: &ThreadCtx) -> Self {
        Self {
            name: name.to_owned(),
            loc,
            lifecycle: Lifecycle::new(name),
            property,
            paths: PathTable::new(name, ctx.path_timeouts),
            proxies: Arc::new(AtomicUsize::new(0)),
            deinit_deferred: false,
            deadline: None,
        }
    }

    pub fn begin(&mut self, phase: Phase, ctx: &ThreadCtx) -> Result<()> {
        self.lifecycle.begin(phase)?;
        self.deadline = Some((phase, Instant::now() + ctx.phase_timeout));
        Ok(())
    }

    fn complete(&mut self, phase: Phase, ctx: &ThreadCtx) -> Result<()> {
        self.lifecycle.complete(phase)?;
        self.deadline = None;
        ctx.post(ThreadTask::Advance {
            target: self.name.clone(),
        });
        Ok(())
    }

    /// Finish a deinit that waited for the last proxy.
    pub fn complete_deferred_deinit(&mut self, ctx: &ThreadCtx) -> Result<()> {
        if !self.deinit_deferred || self.proxies.load(Ordering::Acquire) > 0 {
            return Ok(());
        }
        self.deinit_deferred = false;
        self.complete(Phase::Deinit, ctx)
    }
}

/// Exists only for the duration of a callback on the extension's thread.
pub struct ExtensionEnv<'a> {
    core: &'a mut ExtensionCore,
    ctx: &'a ThreadCtx,
    token: ThreadToken<ExtensionCore>,
}

impl<'a> ExtensionEnv<'a> {
    pub(crate) fn new(core: &'a mut ExtensionCore, ctx: &'a ThreadCtx) -> Result<Self> {
        let token = ThreadToken::acquire(ctx.owner)?;
        Ok(Self { core, ctx, token })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn loc(&self) -> &Loc {
        &self.core.loc
    }

    pub fn group(&self) -> &str {
        &self.ctx.group
    }

    pub fn state(&self) -> LifecycleState {
        self.core.lifecycle.state()
    }

    /// An acknowledgment out of order breaks the lifecycle for good: the
    /// extension is torn down once the current callback returns.
    fn ack(&mut self, phase: Phase) -> Result<()> {
        let live = self.core.proxies.load(Ordering::Acquire);
        let acked = if phase == Phase::Deinit && live > 0 {
            self.core.lifecycle.expect_running(phase).map(|()| {
                self.core.deinit_deferred = true;
                tracing::debug!(extension = %self.core.name, proxies = live, "deinit deferred until proxies are released");
            })
        } else {
            self.core.complete(phase, self.ctx)
        };
        if let Err(e) = &acked {
            self.ctx.post(ThreadTask::Fail {
                target: self.core.name.clone(),
                reason: e.to_string(),
            });
        }
        acked
    }

    pub fn on_configure_done(&mut self) -> Result<()> {
        self.ack(Phase::Configure)
    }

    pub fn on_init_done(&mut self) -> Result<()> {
        self.ack(Phase::Init)
    }

    pub fn on_start_done(&mut self) -> Result<()> {
        self.ack(Phase::Start)
    }

    pub fn on_stop_done(&mut self) -> Result<()> {
        self.ack(Phase::Stop)
    }

    /// Acknowledge deinit. While proxies of this extension are alive the
    /// acknowledgment is held back and takes effect when the last one drops.
    pub fn on_deinit_done(&mut self) -> Result<()> {
        self.ack(Phase::Deinit)
    }

    /// Fill in the source and, when the sender named none, the destinations
    /// configured for this message in the graph.
    fn address<M: Msg>(&self, msg: &mut M) -> Result<ResultReturnPolicy> {
        msg.set_src(self.core.loc.clone());
        if !msg.dests().is_empty() {
            let dests = msg.dests().iter().map(|d| self.ctx.graph.complete_loc(d)).collect();
            msg.set_dests(dests);
            return Ok(ResultReturnPolicy::default());
        }
        let route = self
            .ctx
            .graph
            .route(&self.core.name, M::MSG_TYPE, msg.name())
            .filter(|r| !r.dests.is_empty())
            .ok_or_else(|| {
                ConfluxError::NotFound(format!(
                    "no destination for {} `{}` from `{}`",
                    M::MSG_TYPE,
                    msg.name(),
                    self.core.name
                ))
            })?;
        msg.set_dests(route.dests.clone());
        Ok(route.policy)
    }

    /// Send a command; each of its results is passed to `handler` on this
    /// thread.
    pub fn send_cmd(&mut self, mut cmd: Cmd, handler: Option<ResultHandler>) -> Result<()> {
        self.token.check();
        let policy = self.address(&mut cmd)?;
        let outgoing = self.core.paths.register_outgoing(cmd, handler, policy)?;
        let ids: Vec<String> = outgoing.iter().map(|c| c.cmd_id().to_owned()).collect();
        for c in outgoing {
            if let Err(e) = self.ctx.engine.route(SharedMsg::share(c)) {
                self.core.paths.cancel_outgoing(&ids);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn send_cmd_with<F>(&mut self, cmd: Cmd, handler: F) -> Result<()>
    where
        F: Fn(&mut ExtensionEnv<'_>, CmdResult) + Send + Sync + 'static,
    {
        self.send_cmd(cmd, Some(Arc::new(handler)))
    }

    fn send_one<M>(&mut self, mut msg: M) -> Result<()>
    where
        M: Msg + Into<Message>,
    {
        self.token.check();
        self.address(&mut msg)?;
        // every destination gets a handle to the same payload
        self.ctx.engine.route(SharedMsg::share(msg))
    }

    pub fn send_data(&mut self, data: Data) -> Result<()> {
        self.send_one(data)
    }

    pub fn send_audio_frame(&mut self, frame: AudioFrame) -> Result<()> {
        self.send_one(frame)
    }

    pub fn send_video_frame(&mut self, frame: VideoFrame) -> Result<()> {
        self.send_one(frame)
    }

    /// Answer a command this extension received. Results for commands that
    /// are no longer pending are dropped with `NotFound`.
    pub fn return_result(&mut self, result: CmdResult) -> Result<()> {
        self.token.check();
        let cmd_id = result.cmd_id().to_owned();
        let mut result = self
            .core
            .paths
            .resolve_in(result)
            .ok_or_else(|| ConfluxError::NotFound(format!("no pending command {cmd_id}")))?;
        result.set_src(self.core.loc.clone());
        self.ctx.engine.route(SharedMsg::share(result))
    }

    /// Copy of the property at `path`; `""` is the whole property tree.
    pub fn peek_property(&self, path: &str) -> Result<Option<Value>> {
        if path.is_empty() {
            return Ok(Some(self.core.property.clone()));
        }
        Ok(self.core.property.peek(path)?.cloned())
    }

    pub fn set_property(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        self.core.property.set(path, value.into())
    }

    /// Replace the whole property tree with a JSON object.
    pub fn init_property_from_json(&mut self, json: &str) -> Result<()> {
        let value = Value::from_json_str(json)?;
        if value.as_object().is_err() {
            return Err(ConfluxError::InvalidArgument(
                "extension property must be a JSON object".into(),
            ));
        }
        self.core.property = value;
        Ok(())
    }

    /// A handle other threads can use to run code against this env.
    pub fn proxy(&self) -> EnvProxy {
        EnvProxy::new(
            self.core.name.clone(),
            self.ctx.tx.clone(),
            self.ctx.owner,
            self.core.proxies.clone(),
        )
    }
}
