use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::codec;
use crate::command::{Message, RawCommand};
use crate::config::RegistryConfig;
use crate::descriptor::{CommandDescriptor, CommandKey};
use crate::error::{CommandError, Result};
use crate::payload::CommandPayload;

/// Collects and validates descriptors before freezing them into a registry.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: BTreeMap<CommandKey, &'static CommandDescriptor>,
    config: RegistryConfig,
}

impl RegistryBuilder {
    /// Create an empty builder with default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the decode policy of the registry being built.
    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and add one descriptor.
    ///
    /// A second descriptor for the same class, command and version is an
    /// error rather than a replacement.
    pub fn register(&mut self, descriptor: &'static CommandDescriptor) -> Result<&mut Self> {
        descriptor.validate()?;
        let key = descriptor.key();
        if self.descriptors.contains_key(&key) {
            return Err(CommandError::DuplicateDescriptor {
                class_id: key.0,
                command_id: key.1,
                version: key.2,
            });
        }
        self.descriptors.insert(key, descriptor);
        Ok(self)
    }

    pub fn register_all<I>(&mut self, descriptors: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = &'static CommandDescriptor>,
    {
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(self)
    }

    /// Register the descriptor behind a typed payload.
    pub fn register_payload<P: CommandPayload>(&mut self) -> Result<&mut Self> {
        self.register(P::DESCRIPTOR)
    }

    pub fn build(&self) -> CommandRegistry {
        debug!(descriptors = self.descriptors.len(), "command registry built");
        CommandRegistry {
            descriptors: self.descriptors.clone(),
            config: self.config,
        }
    }
}

/// Immutable lookup table from (class, command, version) to descriptor.
///
/// Safe to share across tasks behind an `Arc`; nothing can be registered
/// once built.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    descriptors: BTreeMap<CommandKey, &'static CommandDescriptor>,
    config: RegistryConfig,
}

impl CommandRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Highest registered version for a class/command pair.
    pub fn lookup(&self, class_id: u8, command_id: u8) -> Option<&'static CommandDescriptor> {
        self.versions(class_id, command_id).next()
    }

    /// Highest registered version not above `version`.
    pub fn lookup_version(
        &self,
        class_id: u8,
        command_id: u8,
        version: u8,
    ) -> Option<&'static CommandDescriptor> {
        self.descriptors
            .range((class_id, command_id, 0)..=(class_id, command_id, version))
            .next_back()
            .map(|(_, descriptor)| *descriptor)
    }

    pub fn contains(&self, class_id: u8, command_id: u8) -> bool {
        self.lookup(class_id, command_id).is_some()
    }

    /// Registered versions of a command, newest first.
    pub fn versions(
        &self,
        class_id: u8,
        command_id: u8,
    ) -> impl Iterator<Item = &'static CommandDescriptor> + '_ {
        self.descriptors
            .range((class_id, command_id, 0)..=(class_id, command_id, u8::MAX))
            .rev()
            .map(|(_, descriptor)| *descriptor)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &'static CommandDescriptor> + '_ {
        self.descriptors.values().copied()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Decode an application payload, header bytes included.
    ///
    /// Versions are tried newest first and the first clean decode wins; when
    /// none fits, the newest version's error is returned. Unregistered
    /// commands come back as [`Message::Unknown`] unless the config says
    /// otherwise.
    pub fn decode(&self, payload: &[u8]) -> Result<Message> {
        let raw = RawCommand::from_payload(payload).ok_or(CommandError::PayloadUnderflow {
            field: "header",
            needed: 2,
            available: payload.len(),
        })?;

        let mut newest_error = None;
        for descriptor in self.versions(raw.class_id, raw.command_id) {
            match codec::decode_with(descriptor, payload, self.config.strict_length) {
                Ok(command) => return Ok(Message::Command(command)),
                Err(err) => {
                    debug!(
                        command = descriptor.name,
                        version = descriptor.version,
                        error = %err,
                        "decode attempt failed"
                    );
                    newest_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = newest_error {
            return Err(err);
        }

        if self.config.fail_on_unknown {
            warn!(
                class_id = raw.class_id,
                command_id = raw.command_id,
                "unknown command rejected"
            );
            return Err(CommandError::UnknownCommand {
                class_id: raw.class_id,
                command_id: raw.command_id,
            });
        }
        debug!(
            class_id = raw.class_id,
            command_id = raw.command_id,
            "passing through unknown command"
        );
        Ok(Message::Unknown(raw))
    }
}
