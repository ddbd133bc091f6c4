//! Cross-thread access to an extension's env.
//!
//! An [`EnvProxy`] never touches the env directly: it posts a job to the
//! owning thread's run loop, where the job runs with a real
//! [`ExtensionEnv`]. While any proxy of an extension is alive, that
//! extension's deinit acknowledgment is held back.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, ThreadId};

use tokio::sync::oneshot;

use conflux_core::error::{ConfluxError, Result};

use super::env::ExtensionEnv;
use super::thread::{ThreadSender, ThreadTask};

pub type NotifyJob = Box<dyn FnOnce(&mut ExtensionEnv<'_>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// Post and return.
    Async,
    /// Post and block until the job ran. Not allowed from the owning thread.
    Sync,
}

/// Signals that a posted job ran.
pub(crate) enum Ack {
    Blocking(std_mpsc::SyncSender<()>),
    Async(oneshot::Sender<()>),
}

impl Ack {
    pub fn send(self) {
        match self {
            Ack::Blocking(tx) => {
                let _ = tx.send(());
            }
            Ack::Async(tx) => {
                let _ = tx.send(());
            }
        }
    }
}

pub struct EnvProxy {
    target: String,
    tx: ThreadSender,
    owner: ThreadId,
    live: Arc<AtomicUsize>,
}

impl EnvProxy {
    pub(crate) fn new(target: String, tx: ThreadSender, owner: ThreadId, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::AcqRel);
        Self {
            target,
            tx,
            owner,
            live,
        }
    }

    /// Name of the extension this proxy reaches.
    pub fn target(&self) -> &str {
        &self.target
    }

    fn post(&self, job: NotifyJob, ack: Option<Ack>) -> Result<()> {
        self.tx
            .send(ThreadTask::Notify {
                target: self.target.clone(),
                job,
                ack,
            })
            .map_err(|_| ConfluxError::Closed(format!("thread of extension `{}`", self.target)))
    }

    fn gone(&self) -> ConfluxError {
        ConfluxError::Closed(format!("extension `{}` is gone, job dropped", self.target))
    }

    pub fn notify<F>(&self, job: F, mode: NotifyMode) -> Result<()>
    where
        F: FnOnce(&mut ExtensionEnv<'_>) + Send + 'static,
    {
        match mode {
            NotifyMode::Async => self.post(Box::new(job), None),
            NotifyMode::Sync => {
                if thread::current().id() == self.owner {
                    let err = ConfluxError::integrity(format!(
                        "sync notify to `{}` from its own thread",
                        self.target
                    ));
                    let _ = self.tx.send(ThreadTask::Fail {
                        target: self.target.clone(),
                        reason: err.to_string(),
                    });
                    return Err(err);
                }
                let (ack_tx, ack_rx) = std_mpsc::sync_channel(1);
                self.post(Box::new(job), Some(Ack::Blocking(ack_tx)))?;
                ack_rx.recv().map_err(|_| self.gone())
            }
        }
    }

    /// Post `job` and wait, without blocking the calling runtime, until it
    /// ran.
    pub async fn notify_async<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut ExtensionEnv<'_>) + Send + 'static,
    {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.post(Box::new(job), Some(Ack::Async(ack_tx)))?;
        ack_rx.await.map_err(|_| self.gone())
    }
}

impl Clone for EnvProxy {
    fn clone(&self) -> Self {
        Self::new(self.target.clone(), self.tx.clone(), self.owner, self.live.clone())
    }
}

impl Drop for EnvProxy {
    fn drop(&mut self) {
        if self.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _ = self.tx.send(ThreadTask::ProxyReleased {
                target: self.target.clone(),
            });
        }
    }
}

impl fmt::Debug for EnvProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvProxy")
            .field("target", &self.target)
            .field("live", &self.live.load(Ordering::Relaxed))
            .finish()
    }
}
