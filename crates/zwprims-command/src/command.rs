use bytes::Bytes;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::codec;
use crate::descriptor::CommandDescriptor;
use crate::error::{CommandError, Result};
use crate::field::FieldValue;

/// A command bound to its descriptor, holding one value per field slot.
///
/// Bit sub-fields are addressed by their own names (`"Level.Size"`), never by
/// the name of the containing byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    descriptor: &'static CommandDescriptor,
    values: Vec<FieldValue>,
}

impl Command {
    /// Create a command with every field at its zero value.
    pub fn new(descriptor: &'static CommandDescriptor) -> Self {
        let values = descriptor
            .slots()
            .map(|(_, slot)| slot.default_value())
            .collect();
        Self { descriptor, values }
    }

    pub(crate) fn from_values(
        descriptor: &'static CommandDescriptor,
        values: Vec<FieldValue>,
    ) -> Self {
        Self { descriptor, values }
    }

    pub fn descriptor(&self) -> &'static CommandDescriptor {
        self.descriptor
    }

    pub fn class_id(&self) -> u8 {
        self.descriptor.class_id
    }

    pub fn command_id(&self) -> u8 {
        self.descriptor.command_id
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Set a field, checking the value has the field's shape.
    ///
    /// Range checks happen at encode time.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        let value = value.into();
        let (index, (field, slot)) = self
            .descriptor
            .slots()
            .enumerate()
            .find(|(_, (slot_name, _))| *slot_name == name)
            .ok_or_else(|| CommandError::UnknownField(name.to_string()))?;
        if !slot.accepts(&value) {
            return Err(CommandError::FieldTypeMismatch {
                field,
                expected: slot.expected(),
            });
        }
        self.values[index] = value;
        Ok(())
    }

    /// Builder form of [`Command::set`].
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.descriptor
            .slot_index(name)
            .and_then(|index| self.values.get(index))
    }

    pub fn uint(&self, name: &str) -> Result<u32> {
        let (field, value) = self.require(name)?;
        value.as_uint().ok_or(CommandError::FieldTypeMismatch {
            field,
            expected: "integer",
        })
    }

    pub fn flag(&self, name: &str) -> Result<bool> {
        let (field, value) = self.require(name)?;
        value.as_flag().ok_or(CommandError::FieldTypeMismatch {
            field,
            expected: "flag",
        })
    }

    pub fn bytes(&self, name: &str) -> Result<&[u8]> {
        let (field, value) = self.require(name)?;
        value.as_bytes().ok_or(CommandError::FieldTypeMismatch {
            field,
            expected: "bytes",
        })
    }

    /// Field names and values in wire order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> + '_ {
        self.descriptor.field_names().zip(self.values.iter())
    }

    pub(crate) fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Encode to an application payload, header bytes included.
    pub fn encode(&self) -> Result<Bytes> {
        codec::encode(self)
    }

    fn require(&self, name: &str) -> Result<(&'static str, &FieldValue)> {
        self.fields()
            .find(|(field, _)| *field == name)
            .ok_or_else(|| CommandError::UnknownField(name.to_string()))
    }
}

struct FieldMap<'a>(&'a Command);

impl Serialize for FieldMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.values.len()))?;
        for (name, value) in self.0.fields() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Command", 5)?;
        state.serialize_field("class_id", &self.descriptor.class_id)?;
        state.serialize_field("command_id", &self.descriptor.command_id)?;
        state.serialize_field("version", &self.descriptor.version)?;
        state.serialize_field("name", self.descriptor.name)?;
        state.serialize_field("fields", &FieldMap(self))?;
        state.end()
    }
}

/// An application command no descriptor matched, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawCommand {
    pub class_id: u8,
    pub command_id: u8,
    /// Bytes after the two header bytes.
    pub payload: Vec<u8>,
}

impl RawCommand {
    /// Split a payload into header and body. `None` when shorter than two bytes.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        match payload {
            [class_id, command_id, rest @ ..] => Some(Self {
                class_id: *class_id,
                command_id: *command_id,
                payload: rest.to_vec(),
            }),
            _ => None,
        }
    }
}

/// Result of decoding an application payload through the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Command(Command),
    Unknown(RawCommand),
}

impl Message {
    pub fn class_id(&self) -> u8 {
        match self {
            Message::Command(command) => command.class_id(),
            Message::Unknown(raw) => raw.class_id,
        }
    }

    pub fn command_id(&self) -> u8 {
        match self {
            Message::Command(command) => command.command_id(),
            Message::Unknown(raw) => raw.command_id,
        }
    }

    pub fn as_command(&self) -> Option<&Command> {
        match self {
            Message::Command(command) => Some(command),
            Message::Unknown(_) => None,
        }
    }
}
