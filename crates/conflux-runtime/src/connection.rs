//! Client connections: endpoints outside the graph that send messages into
//! it and receive command results back.
//!
//! Each connection owns a mutex-guarded path table. Results are resolved on
//! the engine loop; handlers run there too.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::oneshot;

use conflux_core::error::{ConfluxError, Result};
use conflux_core::msg::{
    AudioFrame, Cmd, CmdResult, ConnectionHandle, Data, Loc, Message, Msg, SharedMsg, VideoFrame,
};

use crate::engine::Engine;
use crate::path::{PathTable, ResultReturnPolicy, Resolved};

pub type ClientHandler = Arc<dyn Fn(CmdResult) + Send + Sync>;

pub(crate) struct ConnectionShared {
    handle: ConnectionHandle,
    loc: Loc,
    paths: Mutex<PathTable<ClientHandler>>,
}

fn call_all(resolved: Vec<Resolved<ClientHandler>>) -> usize {
    let n = resolved.len();
    for Resolved { handler, result } in resolved {
        if let Some(handler) = handler {
            handler(result);
        }
    }
    n
}

impl ConnectionShared {
    fn paths(&self) -> MutexGuard<'_, PathTable<ClientHandler>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn deliver(&self, result: CmdResult) {
        // never call a handler with the table locked
        let resolved = self.paths().resolve_out(result);
        if let Some(resolved) = resolved {
            call_all(vec![resolved]);
        }
    }

    pub fn sweep(&self, now: Instant) {
        let expired = self.paths().take_expired(now);
        call_all(expired);
    }

    /// Mark closed and fail every pending command. Returns how many results
    /// were synthesized.
    pub fn close(&self, detail: &str) -> usize {
        self.handle.mark_closed();
        let flushed = self.paths().flush_with_error(detail);
        let n = call_all(flushed);
        if n > 0 {
            tracing::info!(connection = %self.handle.id(), failed = n, "pending commands failed on close");
        }
        n
    }
}

pub struct ClientConnection {
    shared: Arc<ConnectionShared>,
    engine: Engine,
}

impl ClientConnection {
    pub(crate) fn open(engine: &Engine) -> Result<Self> {
        use crate::engine::EngineState;

        if !matches!(engine.state(), EngineState::Starting | EngineState::Running) {
            return Err(ConfluxError::Closed("engine is not running".into()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let shared = Arc::new(ConnectionShared {
            handle: ConnectionHandle::new(id.clone()),
            loc: engine.graph().app_loc(),
            paths: Mutex::new(PathTable::new(format!("connection {id}"), engine.path_timeouts())),
        });
        engine.register_connection(&id, shared.clone());
        tracing::debug!(connection = %id, "client connected");
        Ok(Self {
            shared,
            engine: engine.clone(),
        })
    }

    pub fn id(&self) -> &str {
        self.shared.handle.id()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.handle.is_closed()
    }

    /// Commands sent and not yet completed.
    pub fn pending(&self) -> usize {
        self.shared.paths().out_path_count()
    }

    fn address<M: Msg>(&self, msg: &mut M) -> Result<()> {
        if self.is_closed() {
            return Err(ConfluxError::Closed(format!("connection {}", self.id())));
        }
        if msg.dests().is_empty() {
            return Err(ConfluxError::InvalidArgument(format!(
                "`{}` from a client needs a destination",
                msg.name()
            )));
        }
        let graph = self.engine.graph();
        let dests = msg.dests().iter().map(|d| graph.complete_loc(d)).collect();
        msg.set_dests(dests);
        msg.set_src(self.shared.loc.clone());
        Ok(())
    }

    /// Send `cmd`; `handler` sees each of its results, the last one marked
    /// completed.
    pub fn send_cmd_with_handler(&self, mut cmd: Cmd, handler: ClientHandler) -> Result<()> {
        self.address(&mut cmd)?;
        cmd.set_original_connection(self.shared.handle.downgrade());
        let outgoing = self
            .shared
            .paths()
            .register_outgoing(cmd, Some(handler), ResultReturnPolicy::default())?;
        let ids: Vec<String> = outgoing.iter().map(|c| c.cmd_id().to_owned()).collect();
        for c in outgoing {
            if let Err(e) = self.engine.sender().route(SharedMsg::share(c)) {
                // nothing will ever answer these
                self.shared.paths().cancel_outgoing(&ids);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Send `cmd` and wait for its completed result.
    pub async fn send_cmd(&self, cmd: Cmd) -> Result<CmdResult> {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        self.send_cmd_with_handler(
            cmd,
            Arc::new(move |result: CmdResult| {
                if !result.is_completed() {
                    return;
                }
                let tx = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(tx) = tx {
                    let _ = tx.send(result);
                }
            }),
        )?;
        rx.await
            .map_err(|_| ConfluxError::Closed("command abandoned without a result".into()))
    }

    fn send_one<M>(&self, mut msg: M) -> Result<()>
    where
        M: Msg + Into<Message>,
    {
        self.address(&mut msg)?;
        self.engine.sender().route(SharedMsg::share(msg))
    }

    pub fn send_data(&self, data: Data) -> Result<()> {
        self.send_one(data)
    }

    pub fn send_audio_frame(&self, frame: AudioFrame) -> Result<()> {
        self.send_one(frame)
    }

    pub fn send_video_frame(&self, frame: VideoFrame) -> Result<()> {
        self.send_one(frame)
    }

    /// Close the connection. Every command still pending gets one error
    /// result through its handler; the count is returned.
    pub fn close(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.engine.unregister_connection(self.id());
        self.shared.close("connection closed")
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.close();
    }
}
