//! Addons shipped with the runtime.

mod default_group;
mod echo;

use std::sync::Arc;

use conflux_core::error::Result;

use crate::addon::{extension_addon, extension_group_addon, AddonKind, AddonManager, AddonStore};
use crate::config::schema::DEFAULT_EXTENSION_GROUP_ADDON;

pub use default_group::DefaultExtensionGroup;
pub use echo::EchoExtension;

pub const ECHO_ADDON: &str = "echo";

/// Announce the built-in addons to `manager`.
pub fn announce(manager: &AddonManager) {
    manager.add(
        AddonKind::ExtensionGroup,
        DEFAULT_EXTENSION_GROUP_ADDON,
        Arc::new(|store: &AddonStore| -> Result<()> {
            store.register(
                AddonKind::ExtensionGroup,
                DEFAULT_EXTENSION_GROUP_ADDON,
                extension_group_addon(|_name: &str| DefaultExtensionGroup),
                None,
            )?;
            Ok(())
        }),
    );
    manager.add(
        AddonKind::Extension,
        ECHO_ADDON,
        Arc::new(|store: &AddonStore| -> Result<()> {
            store.register(
                AddonKind::Extension,
                ECHO_ADDON,
                extension_addon(EchoExtension::new),
                None,
            )?;
            Ok(())
        }),
    );
}

/// Register every built-in addon into `store`.
pub fn register_builtin(store: &AddonStore) -> Result<()> {
    let manager = AddonManager::new();
    announce(&manager);
    manager.register_all(store)
}
