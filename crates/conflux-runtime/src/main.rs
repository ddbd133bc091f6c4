//! conflux runtime binary.
//!
//! Boots an app from a YAML config (first argument, or `conflux.yaml`)
//! with the built-in addons, and runs it until Ctrl-C.

use conflux_runtime::addon::AddonStore;
use conflux_runtime::{builtin, config, logging, App};

#[tokio::main]
async fn main() {
    let path = std::env::args().nth(1).unwrap_or_else(|| "conflux.yaml".to_owned());
    let cfg = config::load_from_file(&path).expect("config load failed");
    logging::init(cfg.app.log_level.as_deref());

    let store = AddonStore::global().clone();
    builtin::register_builtin(&store).expect("built-in addons failed to register");

    tracing::info!(%path, uri = %cfg.app.uri, "conflux starting");
    let app = App::start(cfg, store).await.expect("app start failed");
    for (extension, reason) in app.engine().failed_extensions() {
        tracing::warn!(%extension, %reason, "extension unavailable");
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received"),
        _ = app.wait() => {}
    }
    app.close().await.expect("app close failed");
}
