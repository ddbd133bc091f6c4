use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use conflux_core::error::{ConfluxError, Result};

use crate::path::{PathTimeouts, ResultReturnPolicy};

pub const DEFAULT_EXTENSION_GROUP: &str = "default";
pub const DEFAULT_EXTENSION_GROUP_ADDON: &str = "default_extension_group";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfluxConfig {
    pub version: u32,

    #[serde(default)]
    pub app: AppSection,

    #[serde(default)]
    pub timeouts: TimeoutsSection,

    #[serde(default)]
    pub graph: GraphSection,
}

impl ConfluxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ConfluxError::InvalidArgument(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.app.validate()?;
        self.timeouts.validate()?;
        self.graph.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppSection {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_graph_id")]
    pub graph_id: String,

    /// Run the engine loop on its own thread instead of the caller's runtime.
    #[serde(default)]
    pub one_event_loop_per_engine: bool,

    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            graph_id: default_graph_id(),
            one_event_loop_per_engine: false,
            log_level: None,
        }
    }
}

impl AppSection {
    pub fn validate(&self) -> Result<()> {
        if self.uri.trim().is_empty() {
            return Err(ConfluxError::InvalidArgument("app.uri must not be empty".into()));
        }
        if self.graph_id.trim().is_empty() {
            return Err(ConfluxError::InvalidArgument("app.graph_id must not be empty".into()));
        }
        Ok(())
    }
}

fn default_uri() -> String {
    "localhost".into()
}
fn default_graph_id() -> String {
    "default".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsSection {
    /// Deadline for an extension to acknowledge one lifecycle phase.
    #[serde(default = "default_lifecycle_phase_ms")]
    pub lifecycle_phase_ms: u64,

    #[serde(default = "default_path_us")]
    pub in_path_us: u64,

    #[serde(default = "default_path_us")]
    pub out_path_us: u64,

    #[serde(default = "default_path_check_interval_us")]
    pub path_check_interval_us: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            lifecycle_phase_ms: default_lifecycle_phase_ms(),
            in_path_us: default_path_us(),
            out_path_us: default_path_us(),
            path_check_interval_us: default_path_check_interval_us(),
        }
    }
}

impl TimeoutsSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=600_000).contains(&self.lifecycle_phase_ms) {
            return Err(ConfluxError::InvalidArgument(
                "timeouts.lifecycle_phase_ms must be between 100 and 600000".into(),
            ));
        }
        if self.in_path_us == 0 || self.out_path_us == 0 {
            return Err(ConfluxError::InvalidArgument(
                "timeouts.in_path_us and out_path_us must be positive".into(),
            ));
        }
        if !(1_000..=3_600_000_000).contains(&self.path_check_interval_us) {
            return Err(ConfluxError::InvalidArgument(
                "timeouts.path_check_interval_us must be between 1000 and 3600000000".into(),
            ));
        }
        Ok(())
    }

    pub fn lifecycle_phase(&self) -> Duration {
        Duration::from_millis(self.lifecycle_phase_ms)
    }

    pub fn paths(&self) -> PathTimeouts {
        PathTimeouts {
            in_path: Duration::from_micros(self.in_path_us),
            out_path: Duration::from_micros(self.out_path_us),
        }
    }

    pub fn path_check_interval(&self) -> Duration {
        Duration::from_micros(self.path_check_interval_us)
    }
}

fn default_lifecycle_phase_ms() -> u64 {
    5000
}
fn default_path_us() -> u64 {
    300_000_000
}
fn default_path_check_interval_us() -> u64 {
    10_000_000
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphSection {
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// Addons backing each group. Groups not listed use the built-in
    /// default group.
    #[serde(default)]
    pub extension_groups: Vec<ExtensionGroupConfig>,

    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

impl GraphSection {
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for node in &self.nodes {
            if node.name.trim().is_empty() || node.addon.trim().is_empty() {
                return Err(ConfluxError::InvalidArgument(
                    "graph.nodes entries need a name and an addon".into(),
                ));
            }
            if node.extension_group.trim().is_empty() {
                return Err(ConfluxError::InvalidArgument(format!(
                    "graph node `{}` has an empty extension_group",
                    node.name
                )));
            }
            if !names.insert(node.name.as_str()) {
                return Err(ConfluxError::InvalidArgument(format!(
                    "graph node `{}` is declared twice",
                    node.name
                )));
            }
            if let Some(p) = &node.property {
                if !p.is_object() {
                    return Err(ConfluxError::InvalidArgument(format!(
                        "graph node `{}`: property must be an object",
                        node.name
                    )));
                }
            }
        }

        let mut groups = HashSet::new();
        for g in &self.extension_groups {
            if !groups.insert(g.name.as_str()) {
                return Err(ConfluxError::InvalidArgument(format!(
                    "extension group `{}` is declared twice",
                    g.name
                )));
            }
        }

        let known = |n: &str| names.contains(n);
        for conn in &self.connections {
            if !known(&conn.extension) {
                return Err(ConfluxError::InvalidArgument(format!(
                    "connection source `{}` is not a graph node",
                    conn.extension
                )));
            }
            for route in conn.routes() {
                if route.name.is_empty() {
                    return Err(ConfluxError::InvalidArgument(format!(
                        "connection from `{}` has a route without a name",
                        conn.extension
                    )));
                }
                if route.dest.is_empty() {
                    return Err(ConfluxError::InvalidArgument(format!(
                        "route `{}` from `{}` has no destination",
                        route.name, conn.extension
                    )));
                }
                if let Some(d) = route.dest.iter().find(|d| !known(&d.extension)) {
                    return Err(ConfluxError::InvalidArgument(format!(
                        "route `{}` from `{}` points at unknown node `{}`",
                        route.name, conn.extension, d.extension
                    )));
                }
            }
        }
        Ok(())
    }

    /// Group names in first-use order.
    pub fn group_names(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for node in &self.nodes {
            if !seen.contains(&node.extension_group.as_str()) {
                seen.push(node.extension_group.as_str());
            }
        }
        seen
    }

    pub fn group_addon(&self, group: &str) -> &str {
        self.extension_groups
            .iter()
            .find(|g| g.name == group)
            .map(|g| g.addon.as_str())
            .unwrap_or(DEFAULT_EXTENSION_GROUP_ADDON)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub name: String,
    pub addon: String,

    #[serde(default = "default_group")]
    pub extension_group: String,

    #[serde(default)]
    pub property: Option<serde_json::Value>,
}

fn default_group() -> String {
    DEFAULT_EXTENSION_GROUP.into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionGroupConfig {
    pub name: String,
    pub addon: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    pub extension: String,

    #[serde(default)]
    pub cmd: Vec<RouteConfig>,

    #[serde(default)]
    pub data: Vec<RouteConfig>,

    #[serde(default)]
    pub audio_frame: Vec<RouteConfig>,

    #[serde(default)]
    pub video_frame: Vec<RouteConfig>,
}

impl ConnectionConfig {
    pub fn routes(&self) -> impl Iterator<Item = &RouteConfig> {
        self.cmd
            .iter()
            .chain(&self.data)
            .chain(&self.audio_frame)
            .chain(&self.video_frame)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub name: String,
    pub dest: Vec<DestConfig>,

    /// Only meaningful for `cmd` routes with several destinations.
    #[serde(default)]
    pub result_return_policy: ResultReturnPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestConfig {
    pub extension: String,
}
