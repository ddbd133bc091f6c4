//! Extension groups: the unit that owns a thread and decides which
//! extensions live on it.

use std::time::Instant;

use conflux_core::error::{ConfluxError, Result};

use crate::addon::AddonKind;
use crate::lifecycle::{Lifecycle, LifecycleState, Phase};
use crate::thread_token::ThreadToken;

use super::thread::{ThreadCtx, ThreadTask};

pub(crate) struct GroupCore {
    pub name: String,
    pub lifecycle: Lifecycle,
    /// Extension instantiations asked for, and how many came back.
    pub requested: usize,
    pub settled: usize,
    pub deadline: Option<(Phase, Instant)>,
}

impl GroupCore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            lifecycle: Lifecycle::new(format!("group {name}")),
            requested: 0,
            settled: 0,
            deadline: None,
        }
    }

    pub fn begin(&mut self, phase: Phase, ctx: &ThreadCtx) -> Result<()> {
        self.lifecycle.begin(phase)?;
        self.deadline = Some((phase, Instant::now() + ctx.phase_timeout));
        Ok(())
    }

    pub fn complete(&mut self, phase: Phase, ctx: &ThreadCtx) -> Result<()> {
        self.lifecycle.complete(phase)?;
        self.deadline = None;
        ctx.post(ThreadTask::GroupAdvance);
        Ok(())
    }
}

/// Lifecycle hooks of a group. Start and stop are driven by the runtime:
/// the group is started once its extensions exist, and stopped once they
/// are all gone.
pub trait ExtensionGroup: Send {
    fn on_configure(&mut self, env: &mut ExtensionGroupEnv<'_>) {
        let _ = env.on_configure_done();
    }

    fn on_init(&mut self, env: &mut ExtensionGroupEnv<'_>) {
        let _ = env.on_init_done();
    }

    /// Ask for this group's extensions. By default every graph node
    /// assigned to the group is created.
    fn on_create_extensions(&mut self, env: &mut ExtensionGroupEnv<'_>) {
        for node in env.node_names() {
            if let Err(e) = env.create_extension(&node) {
                tracing::warn!(group = %env.name(), extension = %node, error = %e, "extension not created");
            }
        }
    }

    fn on_deinit(&mut self, env: &mut ExtensionGroupEnv<'_>) {
        let _ = env.on_deinit_done();
    }
}

pub struct ExtensionGroupEnv<'a> {
    core: &'a mut GroupCore,
    ctx: &'a ThreadCtx,
    token: ThreadToken<GroupCore>,
}

impl<'a> ExtensionGroupEnv<'a> {
    pub(crate) fn new(core: &'a mut GroupCore, ctx: &'a ThreadCtx) -> Result<Self> {
        let token = ThreadToken::acquire(ctx.owner)?;
        Ok(Self { core, ctx, token })
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn state(&self) -> LifecycleState {
        self.core.lifecycle.state()
    }

    /// A rejected acknowledgment also tears the group down.
    fn ack(&mut self, phase: Phase) -> Result<()> {
        let acked = self.core.complete(phase, self.ctx);
        if let Err(e) = &acked {
            self.ctx.post(ThreadTask::FailGroup {
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

    pub fn on_deinit_done(&mut self) -> Result<()> {
        self.ack(Phase::Deinit)
    }

    /// Graph nodes assigned to this group.
    pub fn node_names(&self) -> Vec<String> {
        self.ctx
            .graph
            .nodes_in_group(&self.core.name)
            .map(|n| n.name.clone())
            .collect()
    }

    /// Instantiate graph node `node` through its addon. The instance joins
    /// this group when the addon completes.
    pub fn create_extension(&mut self, node: &str) -> Result<()> {
        self.token.check();
        if self.core.lifecycle.state() != LifecycleState::Starting {
            return Err(ConfluxError::LifecycleViolation {
                entity: self.core.name.clone(),
                action: format!("create extension `{node}`"),
                state: self.core.lifecycle.state().as_str().to_owned(),
            });
        }
        let found = self
            .ctx
            .graph
            .node(node)
            .filter(|n| n.group == self.core.name)
            .ok_or_else(|| {
                ConfluxError::NotFound(format!("node `{node}` in group `{}`", self.core.name))
            })?;

        let tx = self.ctx.tx.clone();
        let name = found.name.clone();
        self.core.requested += 1;
        let requested = self.ctx.store.create_instance(
            AddonKind::Extension,
            &found.addon,
            &found.name,
            Box::new(move |result| {
                let _ = tx.send(ThreadTask::ExtensionCreated { name, result });
            }),
        );
        if let Err(e) = &requested {
            // settles like a failed asynchronous completion
            self.ctx.post(ThreadTask::ExtensionCreated {
                name: found.name.clone(),
                result: Err(e.clone()),
            });
        }
        requested
    }
}
