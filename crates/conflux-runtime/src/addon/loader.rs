//! Addon loaders: addons whose instances register further addons, for
//! example from a plugin directory or another language host.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use conflux_core::error::{ConfluxError, Result};

use super::{AddonHost, AddonInstance, AddonKind, AddonStore};

#[async_trait]
pub trait AddonLoader: Send + Sync {
    /// Register the addons this loader provides into `store`.
    async fn load(&self, store: &AddonStore) -> Result<()>;

    async fn unload(&self, _store: &AddonStore) -> Result<()> {
        Ok(())
    }
}

/// A loader instance together with the addon that produced it.
pub(crate) struct LoadedLoader {
    host: Arc<AddonHost>,
    loader: Box<dyn AddonLoader>,
}

/// Instantiate every registered addon loader and let each load.
pub(crate) async fn load_all(store: &AddonStore) -> Result<Vec<LoadedLoader>> {
    let mut loaded = Vec::new();
    for name in store.registered(AddonKind::AddonLoader) {
        let Some(host) = store.find(AddonKind::AddonLoader, &name) else {
            continue;
        };
        let (tx, rx) = oneshot::channel();
        store.create_instance(
            AddonKind::AddonLoader,
            &name,
            &name,
            Box::new(move |res| {
                let _ = tx.send(res);
            }),
        )?;
        let instance = rx
            .await
            .map_err(|_| ConfluxError::Cancelled(format!("addon loader `{name}` dropped its completion")))??;
        let AddonInstance::AddonLoader(loader) = instance else {
            host.destroy_instance(instance);
            return Err(ConfluxError::InvalidArgument(format!(
                "addon `{name}` did not produce an addon loader"
            )));
        };
        loader.load(store).await?;
        tracing::info!(loader = %name, "addon loader loaded");
        loaded.push(LoadedLoader { host, loader });
    }
    Ok(loaded)
}

/// Unload in reverse load order and hand each instance back to its addon.
pub(crate) async fn unload_all(store: &AddonStore, loaders: Vec<LoadedLoader>) {
    for LoadedLoader { host, loader } in loaders.into_iter().rev() {
        if let Err(e) = loader.unload(store).await {
            tracing::warn!(loader = %host.name(), error = %e, "addon loader unload failed");
        }
        host.destroy_instance(AddonInstance::AddonLoader(loader));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::FnAddon;

    struct ProtocolLoader;

    #[async_trait]
    impl AddonLoader for ProtocolLoader {
        async fn load(&self, store: &AddonStore) -> Result<()> {
            store.register(
                AddonKind::Protocol,
                "loaded",
                Arc::new(FnAddon::new(|_: &str| Ok(AddonInstance::Other(Box::new(()))))),
                None,
            )?;
            Ok(())
        }

        async fn unload(&self, store: &AddonStore) -> Result<()> {
            store.unregister(AddonKind::Protocol, "loaded");
            Ok(())
        }
    }

    #[tokio::test]
    async fn loaders_register_and_remove_their_addons() {
        let store = AddonStore::new();
        store
            .register(
                AddonKind::AddonLoader,
                "plugins",
                Arc::new(FnAddon::new(|_: &str| {
                    Ok(AddonInstance::AddonLoader(Box::new(ProtocolLoader)))
                })),
                None,
            )
            .unwrap();

        let loaded = load_all(&store).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(store.find(AddonKind::Protocol, "loaded").is_some());

        unload_all(&store, loaded).await;
        assert!(store.find(AddonKind::Protocol, "loaded").is_none());
    }
}
