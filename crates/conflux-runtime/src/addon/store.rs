//! The addon registry.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tokio::sync::Notify;

use conflux_core::error::{ConfluxError, Result};

use super::{Addon, AddonContext, AddonInstance, AddonKind, CreateDone};

/// A registered addon.
pub struct AddonHost {
    ctx: AddonContext,
    addon: Arc<dyn Addon>,
}

impl AddonHost {
    pub fn kind(&self) -> AddonKind {
        self.ctx.kind
    }

    pub fn name(&self) -> &str {
        &self.ctx.addon_name
    }

    pub fn base_dir(&self) -> Option<&std::path::Path> {
        self.ctx.base_dir.as_deref()
    }

    pub fn context(&self) -> &AddonContext {
        &self.ctx
    }

    pub fn destroy_instance(&self, instance: AddonInstance) {
        tracing::debug!(kind = %self.ctx.kind, addon = %self.ctx.addon_name, "destroying instance");
        self.addon.destroy_instance(&self.ctx, instance);
    }
}

impl std::fmt::Debug for AddonHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddonHost")
            .field("kind", &self.ctx.kind)
            .field("name", &self.ctx.addon_name)
            .field("base_dir", &self.ctx.base_dir)
            .finish()
    }
}

/// What `unregister_all` does with instantiations still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnregisterPolicy {
    /// Refuse new instantiations, wait until every pending completion was
    /// delivered, then clear.
    #[default]
    Drain,
    /// Clear at once. A completion arriving afterwards reaches its callback
    /// as `Cancelled`, and its instance goes back to the addon.
    Cancel,
}

struct StoreInner {
    hosts: DashMap<(AddonKind, String), Arc<AddonHost>>,
    in_flight: AtomicUsize,
    accepting: AtomicBool,
    generation: AtomicU64,
    drained: Notify,
}

/// Registry of addons by (kind, name). Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AddonStore {
    inner: Arc<StoreInner>,
}

impl Default for AddonStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts one in-flight instantiation until dropped, whether or not the
/// addon ever calls back.
struct Pending {
    inner: Arc<StoreInner>,
}

impl Drop for Pending {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

impl AddonStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                hosts: DashMap::new(),
                in_flight: AtomicUsize::new(0),
                accepting: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                drained: Notify::new(),
            }),
        }
    }

    /// Process-wide store, created on first use.
    pub fn global() -> &'static AddonStore {
        static GLOBAL: OnceLock<AddonStore> = OnceLock::new();
        GLOBAL.get_or_init(AddonStore::new)
    }

    pub fn register(
        &self,
        kind: AddonKind,
        name: &str,
        addon: Arc<dyn Addon>,
        base_dir: Option<PathBuf>,
    ) -> Result<Arc<AddonHost>> {
        use dashmap::mapref::entry::Entry;

        match self.inner.hosts.entry((kind, name.to_owned())) {
            Entry::Occupied(_) => {
                tracing::warn!(%kind, addon = %name, "addon registered twice");
                Err(ConfluxError::AlreadyRegistered(format!("{kind} addon `{name}`")))
            }
            Entry::Vacant(slot) => {
                let host = Arc::new(AddonHost {
                    ctx: AddonContext {
                        kind,
                        addon_name: name.to_owned(),
                        base_dir,
                    },
                    addon,
                });
                slot.insert(host.clone());
                tracing::debug!(%kind, addon = %name, "addon registered");
                Ok(host)
            }
        }
    }

    pub fn find(&self, kind: AddonKind, name: &str) -> Option<Arc<AddonHost>> {
        self.inner
            .hosts
            .get(&(kind, name.to_owned()))
            .map(|h| h.value().clone())
    }

    pub fn unregister(&self, kind: AddonKind, name: &str) -> Option<Arc<AddonHost>> {
        self.inner
            .hosts
            .remove(&(kind, name.to_owned()))
            .map(|(_, h)| h)
    }

    pub fn registered(&self, kind: AddonKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .hosts
            .iter()
            .filter(|e| e.key().0 == kind)
            .map(|e| e.key().1.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.hosts.is_empty()
    }

    /// Instantiations requested but not yet completed.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Ask addon `addon_name` of `kind` for an instance. The outcome always
    /// arrives through `done`; the returned error only covers requests that
    /// could not be made at all.
    pub fn create_instance(
        &self,
        kind: AddonKind,
        addon_name: &str,
        instance_name: &str,
        done: CreateDone,
    ) -> Result<()> {
        // counted before the accepting check: a drain either sees this
        // request in flight or the request sees the drain
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let pending = Pending {
            inner: self.inner.clone(),
        };
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(ConfluxError::Cancelled("addon store is unregistering".into()));
        }
        let host = self
            .find(kind, addon_name)
            .ok_or_else(|| ConfluxError::NotFound(format!("{kind} addon `{addon_name}`")))?;
        let generation = self.inner.generation.load(Ordering::Acquire);
        let completion_host = host.clone();
        let instance = instance_name.to_owned();

        let wrapped: CreateDone = Box::new(move |res| {
            let current = pending.inner.generation.load(Ordering::Acquire);
            if current != generation {
                tracing::debug!(addon = %completion_host.name(), %instance, "instantiation cancelled by unregister");
                if let Ok(inst) = res {
                    completion_host.destroy_instance(inst);
                }
                drop(pending);
                done(Err(ConfluxError::Cancelled(format!(
                    "instance `{instance}` of addon `{}`",
                    completion_host.name()
                ))));
                return;
            }
            done(res);
            drop(pending);
        });

        tracing::debug!(%kind, addon = %addon_name, instance = %instance_name, "creating instance");
        host.addon.create_instance(host.context(), instance_name, wrapped);
        Ok(())
    }

    /// Remove every addon. Addon loaders go last since they may host the
    /// others.
    pub async fn unregister_all(&self, policy: UnregisterPolicy) {
        match policy {
            UnregisterPolicy::Drain => {
                self.inner.accepting.store(false, Ordering::SeqCst);
                loop {
                    let notified = self.inner.drained.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    if self.in_flight() == 0 {
                        break;
                    }
                    notified.await;
                }
            }
            UnregisterPolicy::Cancel => {
                self.inner.generation.fetch_add(1, Ordering::AcqRel);
            }
        }

        let mut removed = 0usize;
        for loaders in [false, true] {
            let keys: Vec<(AddonKind, String)> = self
                .inner
                .hosts
                .iter()
                .filter(|e| (e.key().0 == AddonKind::AddonLoader) == loaders)
                .map(|e| e.key().clone())
                .collect();
            for key in keys {
                if self.inner.hosts.remove(&key).is_some() {
                    tracing::debug!(kind = %key.0, addon = %key.1, "addon unregistered");
                    removed += 1;
                }
            }
        }
        self.inner.accepting.store(true, Ordering::SeqCst);
        tracing::info!(?policy, removed, "addons unregistered");
    }
}
