//! conflux runtime library entry.
//!
//! This crate runs a graph of extensions: the addon registry that produces
//! them, one thread per extension group driving their lifecycle, the path
//! tables that correlate commands with results, and the engine that routes
//! messages between extensions and client connections. It is consumed by
//! the binary (`main.rs`), by embedders, and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod addon;
pub mod app;
pub mod builtin;
pub mod config;
pub mod connection;
pub mod engine;
pub mod extension;
pub mod graph;
pub mod lifecycle;
pub mod logging;
pub mod path;
pub mod thread_token;

pub use app::App;
pub use connection::ClientConnection;
pub use engine::{Engine, EngineState};
pub use extension::{Extension, ExtensionEnv, ExtensionGroup, ExtensionGroupEnv};
