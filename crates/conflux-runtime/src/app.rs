//! The app: one engine plus the addon loaders it was started with.

use tokio::sync::{watch, Mutex};

use conflux_core::error::Result;

use crate::addon::loader::{self, LoadedLoader};
use crate::addon::AddonStore;
use crate::config::ConfluxConfig;
use crate::connection::ClientConnection;
use crate::engine::Engine;

pub struct App {
    engine: Engine,
    store: AddonStore,
    loaders: Mutex<Vec<LoadedLoader>>,
    closed: watch::Sender<bool>,
}

impl App {
    /// Load addon loaders, then start the engine for `config.graph`.
    pub async fn start(config: ConfluxConfig, store: AddonStore) -> Result<App> {
        config.validate()?;
        let loaders = loader::load_all(&store).await?;
        let engine = Engine::start(&config, store.clone()).await?;
        tracing::info!(uri = %config.app.uri, "app started");
        let (closed, _) = watch::channel(false);
        Ok(App {
            engine,
            store,
            loaders: Mutex::new(loaders),
            closed,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn store(&self) -> &AddonStore {
        &self.store
    }

    pub fn connect(&self) -> Result<ClientConnection> {
        self.engine.connect()
    }

    /// Close the engine, then unload addon loaders. Safe to call twice.
    pub async fn close(&self) -> Result<()> {
        if *self.closed.borrow() {
            return Ok(());
        }
        self.engine.close().await?;
        let loaders = std::mem::take(&mut *self.loaders.lock().await);
        loader::unload_all(&self.store, loaders).await;
        self.closed.send_replace(true);
        tracing::info!("app closed");
        Ok(())
    }

    /// Resolve once the app was closed.
    pub async fn wait(&self) {
        let mut rx = self.closed.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
