//! The engine: owns the graph, its extension threads, and the client
//! connections, and routes every message between them.
//!
//! Routing happens on the engine's own run loop. Threads and connections
//! post [`EngineTask`]s; the loop forwards one envelope handle per
//! destination.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, watch};

use conflux_core::error::{ConfluxError, Result};
use conflux_core::msg::{CmdResult, Loc, Message, Msg, SharedMsg};

use crate::addon::AddonStore;
use crate::config::ConfluxConfig;
use crate::connection::{ClientConnection, ConnectionShared};
use crate::extension::thread::{self as ext_thread, ExtensionThreadHandle, ThreadConfig, ThreadSender, ThreadTask};
use crate::graph::Graph;
use crate::path::PathTimeouts;

pub(crate) enum EngineTask {
    Route(SharedMsg),
    ExtensionFailed { extension: String, reason: String },
    Shutdown { done: oneshot::Sender<()> },
}

#[derive(Clone)]
pub(crate) struct EngineSender(mpsc::UnboundedSender<EngineTask>);

impl EngineSender {
    pub fn route(&self, msg: SharedMsg) -> Result<()> {
        self.0
            .send(EngineTask::Route(msg))
            .map_err(|_| ConfluxError::Closed("engine".into()))
    }

    pub fn extension_failed(&self, extension: &str, reason: &str) {
        let _ = self.0.send(EngineTask::ExtensionFailed {
            extension: extension.to_owned(),
            reason: reason.to_owned(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Init,
    Starting,
    Running,
    Closing,
    Closed,
}

/// State the engine loop shares with the engine handle.
pub(crate) struct Shared {
    pub graph: Arc<Graph>,
    routes: DashMap<String, ThreadSender>,
    failed: DashMap<String, String>,
    connections: DashMap<String, Arc<ConnectionShared>>,
}

struct EngineInner {
    shared: Arc<Shared>,
    tx: EngineSender,
    threads: tokio::sync::Mutex<Vec<ExtensionThreadHandle>>,
    loop_thread: Mutex<Option<JoinHandle<()>>>,
    state: watch::Sender<EngineState>,
    phase_timeout: Duration,
    path_timeouts: PathTimeouts,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Start the engine loop and one thread per extension group, and wait
    /// until every group reported its extensions started (or failed).
    pub async fn start(cfg: &ConfluxConfig, store: AddonStore) -> Result<Engine> {
        cfg.validate()?;
        let graph = Arc::new(Graph::from_config(cfg)?);
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            graph: graph.clone(),
            routes: DashMap::new(),
            failed: DashMap::new(),
            connections: DashMap::new(),
        });

        let run_loop = EngineLoop {
            shared: shared.clone(),
            check_interval: cfg.timeouts.path_check_interval(),
        };
        let loop_thread = if cfg.app.one_event_loop_per_engine {
            let handle = thread::Builder::new()
                .name("conflux-engine".into())
                .spawn(move || {
                    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                        Ok(rt) => rt.block_on(run_loop.run(rx)),
                        Err(e) => tracing::error!(error = %e, "engine runtime failed"),
                    }
                })
                .map_err(|e| ConfluxError::Internal(format!("spawn engine thread: {e}")))?;
            Some(handle)
        } else {
            tokio::spawn(run_loop.run(rx));
            None
        };

        let (state, _) = watch::channel(EngineState::Init);
        let engine = Engine {
            inner: Arc::new(EngineInner {
                shared,
                tx: EngineSender(tx),
                threads: tokio::sync::Mutex::new(Vec::new()),
                loop_thread: Mutex::new(loop_thread),
                state,
                phase_timeout: cfg.timeouts.lifecycle_phase(),
                path_timeouts: cfg.timeouts.paths(),
            }),
        };
        engine.set_state(EngineState::Starting);

        let mut readiness = Vec::new();
        {
            let mut threads = engine.inner.threads.lock().await;
            for (group, addon) in graph.groups() {
                let (ready_tx, ready_rx) = oneshot::channel();
                let handle = ext_thread::spawn(
                    ThreadConfig {
                        group: group.clone(),
                        group_addon: addon.clone(),
                        engine: engine.inner.tx.clone(),
                        graph: graph.clone(),
                        store: store.clone(),
                        phase_timeout: engine.inner.phase_timeout,
                        path_timeouts: engine.inner.path_timeouts,
                        path_check_interval: cfg.timeouts.path_check_interval(),
                    },
                    ready_tx,
                )?;
                for node in graph.nodes_in_group(group) {
                    engine.inner.shared.routes.insert(node.name.clone(), handle.sender());
                }
                let members = graph.nodes_in_group(group).count() as u32;
                readiness.push((group.clone(), members, ready_rx));
                threads.push(handle);
            }
        }

        for (group, members, ready) in readiness {
            // group create + configure + init, then three phases per extension
            let bound = engine.inner.phase_timeout * (4 + 3 * members);
            match tokio::time::timeout(bound, ready).await {
                Ok(Ok(())) => tracing::debug!(%group, "extension group ready"),
                Ok(Err(_)) => tracing::error!(%group, "extension thread exited during startup"),
                Err(_) => tracing::warn!(%group, ?bound, "extension group not ready in time"),
            }
        }

        engine.set_state(EngineState::Running);
        tracing::info!(
            app = %graph.app_uri(),
            graph = %graph.graph_id(),
            groups = graph.groups().len(),
            extensions = graph.nodes().len(),
            failed = engine.inner.shared.failed.len(),
            "engine started"
        );
        Ok(engine)
    }

    fn set_state(&self, state: EngineState) {
        self.inner.state.send_replace(state);
    }

    pub fn state(&self) -> EngineState {
        *self.inner.state.borrow()
    }

    pub fn graph(&self) -> &Graph {
        &self.inner.shared.graph
    }

    /// Extensions that failed, with the reason.
    pub fn failed_extensions(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .inner
            .shared
            .failed
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        out.sort();
        out
    }

    pub fn connect(&self) -> Result<ClientConnection> {
        ClientConnection::open(self)
    }

    pub(crate) fn sender(&self) -> &EngineSender {
        &self.inner.tx
    }

    pub(crate) fn path_timeouts(&self) -> PathTimeouts {
        self.inner.path_timeouts
    }

    pub(crate) fn register_connection(&self, id: &str, conn: Arc<ConnectionShared>) {
        self.inner.shared.connections.insert(id.to_owned(), conn);
    }

    pub(crate) fn unregister_connection(&self, id: &str) {
        self.inner.shared.connections.remove(id);
    }

    /// Close connections, then each extension thread in turn, waiting for
    /// one to finish before closing the next, then stop the loop.
    pub async fn close(&self) -> Result<()> {
        match self.state() {
            EngineState::Closing | EngineState::Closed => {
                self.wait_closed().await;
                return Ok(());
            }
            _ => self.set_state(EngineState::Closing),
        }
        tracing::info!("engine closing");

        let connections: Vec<Arc<ConnectionShared>> = self
            .inner
            .shared
            .connections
            .iter()
            .map(|e| e.value().clone())
            .collect();
        self.inner.shared.connections.clear();
        for conn in connections {
            conn.close("engine closed");
        }

        let threads = std::mem::take(&mut *self.inner.threads.lock().await);
        for handle in threads {
            let group = handle.group().to_owned();
            let members = self.graph().nodes_in_group(&group).count() as u32;
            let bound = self.inner.phase_timeout * (3 + 2 * members);
            handle.close(bound).await;
            for node in self.graph().nodes_in_group(&group) {
                self.inner.shared.routes.remove(&node.name);
            }
            tracing::debug!(%group, "extension thread closed");
        }

        let (done_tx, done_rx) = oneshot::channel();
        if self.inner.tx.0.send(EngineTask::Shutdown { done: done_tx }).is_ok() {
            let _ = done_rx.await;
        }
        let loop_thread = self
            .inner
            .loop_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(join) = loop_thread {
            let _ = tokio::task::spawn_blocking(move || join.join()).await;
        }

        self.set_state(EngineState::Closed);
        tracing::info!("engine closed");
        Ok(())
    }

    pub async fn wait_closed(&self) {
        let mut rx = self.inner.state.subscribe();
        while *rx.borrow_and_update() != EngineState::Closed {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

struct EngineLoop {
    shared: Arc<Shared>,
    check_interval: Duration,
}

impl EngineLoop {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<EngineTask>) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                task = rx.recv() => match task {
                    Some(EngineTask::Route(msg)) => self.route(msg),
                    Some(EngineTask::ExtensionFailed { extension, reason }) => {
                        tracing::error!(%extension, %reason, "extension failed, no longer routed");
                        self.shared.routes.remove(&extension);
                        self.shared.failed.insert(extension, reason);
                    }
                    Some(EngineTask::Shutdown { done }) => {
                        let _ = done.send(());
                        break;
                    }
                    None => break,
                },
                _ = ticker.tick() => self.sweep_connections(),
            }
        }
        tracing::debug!("engine loop stopped");
    }

    fn route(&self, msg: SharedMsg) {
        if msg.dests().is_empty() {
            tracing::warn!(msg_type = %msg.msg_type(), name = %msg.name(), "message without destination dropped");
            return;
        }
        let graph = &self.shared.graph;
        for dest in msg.dests() {
            if dest.app_uri.as_deref().is_some_and(|uri| uri != graph.app_uri()) {
                self.undeliverable(dest, &msg, "unknown app");
                continue;
            }
            match dest.extension.as_deref() {
                Some(name) => self.to_extension(name, dest, &msg),
                None => self.to_connection(&msg),
            }
        }
    }

    fn to_extension(&self, name: &str, dest: &Loc, msg: &SharedMsg) {
        if let Some(tx) = self.shared.routes.get(name) {
            let task = ThreadTask::Deliver {
                target: name.to_owned(),
                msg: msg.clone(),
            };
            if tx.send(task).is_ok() {
                return;
            }
        }
        let why = match self.shared.failed.get(name) {
            Some(reason) => format!("extension failed ({})", reason.value()),
            None => "extension not found".to_owned(),
        };
        self.undeliverable(dest, msg, &why);
    }

    fn to_connection(&self, msg: &SharedMsg) {
        let Message::CmdResult(result) = &**msg else {
            tracing::warn!(msg_type = %msg.msg_type(), name = %msg.name(), "only command results can be delivered to a client");
            return;
        };
        let Some(id) = result.original_connection().and_then(|c| c.id()) else {
            tracing::warn!(cmd_id = %result.cmd_id(), "result for a closed connection dropped");
            return;
        };
        let conn = self.shared.connections.get(&id).map(|c| c.value().clone());
        match conn {
            Some(conn) => conn.deliver(result.clone()),
            None => tracing::warn!(connection = %id, cmd_id = %result.cmd_id(), "result for an unknown connection dropped"),
        }
    }

    /// Answer an undeliverable command with an error result to its sender.
    fn undeliverable(&self, dest: &Loc, msg: &SharedMsg, why: &str) {
        let Message::Cmd(cmd) = &**msg else {
            tracing::warn!(msg_type = %msg.msg_type(), name = %msg.name(), %dest, %why, "message dropped");
            return;
        };
        let mut result = CmdResult::error_for(cmd, format!("{why}: {dest}"));
        result.set_src(dest.clone());
        result.set_dests(vec![cmd.src().clone()]);
        self.route(SharedMsg::share(result));
    }

    fn sweep_connections(&self) {
        let now = Instant::now();
        let connections: Vec<Arc<ConnectionShared>> =
            self.shared.connections.iter().map(|e| e.value().clone()).collect();
        for conn in connections {
            conn.sweep(now);
        }
    }
}
