use bytes::Bytes;

use crate::codec;
use crate::command::Command;
use crate::descriptor::CommandDescriptor;
use crate::error::{CommandError, Result};

/// A typed view of one command layout.
///
/// Implementors map their struct fields to and from a [`Command`]; the byte
/// work is shared with the schema-driven codec.
pub trait CommandPayload: Sized {
    const DESCRIPTOR: &'static CommandDescriptor;

    fn to_command(&self) -> Result<Command>;

    /// Build from a command already known to match [`Self::DESCRIPTOR`].
    fn from_fields(command: &Command) -> Result<Self>;

    fn from_command(command: &Command) -> Result<Self> {
        let expected = (Self::DESCRIPTOR.class_id, Self::DESCRIPTOR.command_id);
        let actual = (command.class_id(), command.command_id());
        if expected != actual {
            return Err(CommandError::CommandMismatch { expected, actual });
        }
        Self::from_fields(command)
    }

    fn encode(&self) -> Result<Bytes> {
        self.to_command()?.encode()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let command = codec::decode(Self::DESCRIPTOR, payload)?;
        Self::from_fields(&command)
    }
}

pub(crate) fn read_u8(command: &Command, field: &'static str) -> Result<u8> {
    let value = command.uint(field)?;
    u8::try_from(value).map_err(|_| overflow(field, value, u8::MAX.into()))
}

pub(crate) fn read_u16(command: &Command, field: &'static str) -> Result<u16> {
    let value = command.uint(field)?;
    u16::try_from(value).map_err(|_| overflow(field, value, u16::MAX.into()))
}

fn overflow(field: &'static str, value: u32, max: u64) -> CommandError {
    CommandError::FieldOverflow {
        field,
        value: u64::from(value),
        max,
    }
}
