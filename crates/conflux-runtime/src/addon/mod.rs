//! Addons: named factories for extensions, extension groups, protocols and
//! addon loaders.
//!
//! What exists is decided by registration in an [`AddonStore`]; when and
//! where an instance is created is decided by the runtime. Creation always
//! completes through a callback, even when the factory is synchronous.

pub mod loader;
pub mod manager;
pub mod store;

use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use conflux_core::error::{ConfluxError, Result};

use crate::extension::{Extension, ExtensionGroup};

pub use loader::AddonLoader;
pub use manager::AddonManager;
pub use store::{AddonHost, AddonStore, UnregisterPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AddonKind {
    Extension,
    ExtensionGroup,
    Protocol,
    AddonLoader,
}

impl AddonKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AddonKind::Extension => "extension",
            AddonKind::ExtensionGroup => "extension_group",
            AddonKind::Protocol => "protocol",
            AddonKind::AddonLoader => "addon_loader",
        }
    }
}

impl FromStr for AddonKind {
    type Err = ConfluxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "extension" => Ok(AddonKind::Extension),
            "extension_group" => Ok(AddonKind::ExtensionGroup),
            "protocol" => Ok(AddonKind::Protocol),
            "addon_loader" => Ok(AddonKind::AddonLoader),
            other => Err(ConfluxError::InvalidArgument(format!("unknown addon kind: {other}"))),
        }
    }
}

impl fmt::Display for AddonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an addon produced.
pub enum AddonInstance {
    Extension(Box<dyn Extension>),
    ExtensionGroup(Box<dyn ExtensionGroup>),
    AddonLoader(Box<dyn AddonLoader>),
    /// Protocol instances and anything else the runtime only carries.
    Other(Box<dyn Any + Send>),
}

impl AddonInstance {
    pub fn kind_name(&self) -> &'static str {
        match self {
            AddonInstance::Extension(_) => "extension",
            AddonInstance::ExtensionGroup(_) => "extension_group",
            AddonInstance::AddonLoader(_) => "addon_loader",
            AddonInstance::Other(_) => "other",
        }
    }
}

impl fmt::Debug for AddonInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddonInstance({})", self.kind_name())
    }
}

/// Completion callback of [`Addon::create_instance`]. Called at most once,
/// from any thread.
pub type CreateDone = Box<dyn FnOnce(Result<AddonInstance>) + Send>;

/// Passed to an addon with every request.
#[derive(Debug, Clone)]
pub struct AddonContext {
    pub kind: AddonKind,
    pub addon_name: String,
    pub base_dir: Option<PathBuf>,
}

pub trait Addon: Send + Sync {
    /// Produce an instance named `instance_name` and hand it to `done`,
    /// now or later.
    fn create_instance(&self, ctx: &AddonContext, instance_name: &str, done: CreateDone);

    /// Take back an instance this addon produced.
    fn destroy_instance(&self, _ctx: &AddonContext, instance: AddonInstance) {
        drop(instance);
    }
}

/// An addon whose instances come from a synchronous constructor.
pub struct FnAddon<F> {
    make: F,
}

impl<F> FnAddon<F>
where
    F: Fn(&str) -> Result<AddonInstance> + Send + Sync + 'static,
{
    pub fn new(make: F) -> Self {
        Self { make }
    }
}

impl<F> Addon for FnAddon<F>
where
    F: Fn(&str) -> Result<AddonInstance> + Send + Sync + 'static,
{
    fn create_instance(&self, _ctx: &AddonContext, instance_name: &str, done: CreateDone) {
        done((self.make)(instance_name));
    }
}

/// Extension addon from a constructor taking the instance name.
pub fn extension_addon<E, F>(make: F) -> Arc<dyn Addon>
where
    E: Extension + 'static,
    F: Fn(&str) -> E + Send + Sync + 'static,
{
    Arc::new(FnAddon::new(move |name: &str| {
        Ok(AddonInstance::Extension(Box::new(make(name))))
    }))
}

/// Extension group addon from a constructor taking the instance name.
pub fn extension_group_addon<G, F>(make: F) -> Arc<dyn Addon>
where
    G: ExtensionGroup + 'static,
    F: Fn(&str) -> G + Send + Sync + 'static,
{
    Arc::new(FnAddon::new(move |name: &str| {
        Ok(AddonInstance::ExtensionGroup(Box::new(make(name))))
    }))
}
