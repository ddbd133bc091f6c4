//! App config loader (strict parsing).

pub mod schema;

use std::fs;

use conflux_core::error::{ConfluxError, Result};

pub use schema::{
    AppSection, ConfluxConfig, ConnectionConfig, DestConfig, ExtensionGroupConfig, GraphSection,
    NodeConfig, RouteConfig, TimeoutsSection,
};

pub fn load_from_file(path: &str) -> Result<ConfluxConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| ConfluxError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ConfluxConfig> {
    let cfg: ConfluxConfig = serde_yaml::from_str(s)
        .map_err(|e| ConfluxError::InvalidArgument(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
