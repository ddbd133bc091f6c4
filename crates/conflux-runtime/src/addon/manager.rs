//! Deferred addon registration.
//!
//! Addons announce themselves early (at startup, from static constructors
//! or plugin entry points) and are registered into a store only when the
//! embedder asks, so a test can register just the addons it needs into its
//! own scoped store.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use conflux_core::error::{ConfluxError, Result};

use super::{AddonKind, AddonStore};

pub type RegisterFn = Arc<dyn Fn(&AddonStore) -> Result<()> + Send + Sync>;

struct Registration {
    kind: AddonKind,
    name: String,
    register: RegisterFn,
}

#[derive(Default)]
pub struct AddonManager {
    pending: Mutex<Vec<Registration>>,
}

impl AddonManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static AddonManager {
        static GLOBAL: OnceLock<AddonManager> = OnceLock::new();
        GLOBAL.get_or_init(AddonManager::new)
    }

    pub fn add(&self, kind: AddonKind, name: &str, register: RegisterFn) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|r| !(r.kind == kind && r.name == name));
        pending.push(Registration {
            kind,
            name: name.to_owned(),
            register,
        });
    }

    pub fn names(&self, kind: AddonKind) -> Vec<String> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.name.clone())
            .collect()
    }

    fn snapshot(&self) -> Vec<(AddonKind, String, RegisterFn)> {
        // callbacks may call back into the manager; never run them locked
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending
            .iter()
            .map(|r| (r.kind, r.name.clone(), r.register.clone()))
            .collect()
    }

    /// Register everything announced so far. Failures are logged and the
    /// rest still registers; the first failure is returned.
    pub fn register_all(&self, store: &AddonStore) -> Result<()> {
        let mut first_err = None;
        for (kind, name, register) in self.snapshot() {
            if let Err(e) = register(store) {
                tracing::warn!(%kind, addon = %name, error = %e, "addon registration failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn register_specific(&self, kind: AddonKind, name: &str, store: &AddonStore) -> Result<()> {
        let register = self
            .snapshot()
            .into_iter()
            .find(|(k, n, _)| *k == kind && n == name)
            .map(|(_, _, f)| f)
            .ok_or_else(|| ConfluxError::NotFound(format!("{kind} addon `{name}` was never announced")))?;
        register(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::{AddonInstance, FnAddon};

    fn announce(manager: &AddonManager, name: &'static str) {
        manager.add(
            AddonKind::Protocol,
            name,
            Arc::new(move |store: &AddonStore| -> Result<()> {
                store.register(
                    AddonKind::Protocol,
                    name,
                    Arc::new(FnAddon::new(|_: &str| Ok(AddonInstance::Other(Box::new(()))))),
                    None,
                )?;
                Ok(())
            }),
        );
    }

    #[test]
    fn specific_registration_leaves_others_pending() {
        let manager = AddonManager::new();
        announce(&manager, "a");
        announce(&manager, "b");

        let store = AddonStore::new();
        manager.register_specific(AddonKind::Protocol, "b", &store).unwrap();
        assert_eq!(store.registered(AddonKind::Protocol), vec!["b".to_owned()]);

        // "b" is already there, so registering everything reports it
        assert!(manager.register_all(&store).is_err());
        assert_eq!(store.len(), 2);
    }
}
