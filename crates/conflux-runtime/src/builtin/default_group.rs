use crate::extension::ExtensionGroup;

/// Creates every graph node assigned to it; everything else acknowledged
/// immediately.
#[derive(Debug, Default)]
pub struct DefaultExtensionGroup;

impl ExtensionGroup for DefaultExtensionGroup {}
