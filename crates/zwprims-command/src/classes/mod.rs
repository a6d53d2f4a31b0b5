//! Descriptors for the command classes this crate ships with.

pub mod basic;
pub mod configuration;
pub mod manufacturer_specific;
pub mod multi_channel_association;
pub mod node_naming;
pub mod switch_binary;
pub mod version;

use crate::config::RegistryConfig;
use crate::descriptor::CommandDescriptor;
use crate::error::Result;
use crate::registry::CommandRegistry;

/// Every descriptor in the bundled classes.
pub fn all() -> impl Iterator<Item = &'static CommandDescriptor> {
    basic::DESCRIPTORS
        .iter()
        .chain(switch_binary::DESCRIPTORS.iter())
        .chain(configuration::DESCRIPTORS.iter())
        .chain(manufacturer_specific::DESCRIPTORS.iter())
        .chain(node_naming::DESCRIPTORS.iter())
        .chain(multi_channel_association::DESCRIPTORS.iter())
        .chain(version::DESCRIPTORS.iter())
        .copied()
}

/// Registry holding every bundled descriptor, with default config.
pub fn standard_registry() -> Result<CommandRegistry> {
    standard_registry_with_config(RegistryConfig::default())
}

pub fn standard_registry_with_config(config: RegistryConfig) -> Result<CommandRegistry> {
    let mut builder = CommandRegistry::builder().with_config(config);
    builder.register_all(all())?;
    Ok(builder.build())
}
