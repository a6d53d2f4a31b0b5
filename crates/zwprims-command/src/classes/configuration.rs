//! Configuration command class (0x70).
//!
//! Parameter values are big-endian and 1, 2 or 4 bytes wide; the width rides
//! in the low three bits of the level byte.

use crate::command::Command;
use crate::descriptor::CommandDescriptor;
use crate::error::{CommandError, Result};
use crate::field::{BitSpec, FieldSpec};
use crate::payload::{read_u8, CommandPayload};

pub const CLASS_ID: u8 = 0x70;

static SET_LEVEL: [BitSpec; 2] = [
    BitSpec::flag("Level.Default", 0x80),
    BitSpec::uint("Level.Size", 0x07),
];

static REPORT_LEVEL: [BitSpec; 1] = [BitSpec::uint("Level.Size", 0x07)];

pub static SET: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x04,
    1,
    "ConfigurationSet",
    &[
        FieldSpec::uint8("ParameterNumber"),
        FieldSpec::bits("Level", &SET_LEVEL),
        FieldSpec::variable("ConfigurationValue", "Level.Size"),
    ],
);

pub static GET: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x05,
    1,
    "ConfigurationGet",
    &[FieldSpec::uint8("ParameterNumber")],
);

pub static REPORT: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x06,
    1,
    "ConfigurationReport",
    &[
        FieldSpec::uint8("ParameterNumber"),
        FieldSpec::bits("Level", &REPORT_LEVEL),
        FieldSpec::variable("ConfigurationValue", "Level.Size"),
    ],
);

pub static DESCRIPTORS: [&CommandDescriptor; 3] = [&SET, &GET, &REPORT];

/// Parameter value as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterValue {
    U8(u8),
    U16(u16),
    U32(u32),
}

impl ParameterValue {
    pub fn to_bytes(self) -> Vec<u8> {
        match self {
            ParameterValue::U8(value) => vec![value],
            ParameterValue::U16(value) => value.to_be_bytes().to_vec(),
            ParameterValue::U32(value) => value.to_be_bytes().to_vec(),
        }
    }

    pub fn from_bytes(field: &'static str, bytes: &[u8]) -> Result<Self> {
        match *bytes {
            [a] => Ok(ParameterValue::U8(a)),
            [a, b] => Ok(ParameterValue::U16(u16::from_be_bytes([a, b]))),
            [a, b, c, d] => Ok(ParameterValue::U32(u32::from_be_bytes([a, b, c, d]))),
            _ => Err(CommandError::WidthMismatch {
                field,
                expected: 4,
                actual: bytes.len(),
            }),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            ParameterValue::U8(value) => value.into(),
            ParameterValue::U16(value) => value.into(),
            ParameterValue::U32(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationSet {
    pub parameter: u8,
    /// Restore the factory default; the value is ignored by the device.
    pub default: bool,
    pub value: ParameterValue,
}

impl CommandPayload for ConfigurationSet {
    const DESCRIPTOR: &'static CommandDescriptor = &SET;

    fn to_command(&self) -> Result<Command> {
        Command::new(&SET)
            .with("ParameterNumber", self.parameter)?
            .with("Level.Default", self.default)?
            .with("ConfigurationValue", self.value.to_bytes())
    }

    fn from_fields(command: &Command) -> Result<Self> {
        Ok(Self {
            parameter: read_u8(command, "ParameterNumber")?,
            default: command.flag("Level.Default")?,
            value: ParameterValue::from_bytes(
                "ConfigurationValue",
                command.bytes("ConfigurationValue")?,
            )?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationGet {
    pub parameter: u8,
}

impl CommandPayload for ConfigurationGet {
    const DESCRIPTOR: &'static CommandDescriptor = &GET;

    fn to_command(&self) -> Result<Command> {
        Command::new(&GET).with("ParameterNumber", self.parameter)
    }

    fn from_fields(command: &Command) -> Result<Self> {
        Ok(Self {
            parameter: read_u8(command, "ParameterNumber")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationReport {
    pub parameter: u8,
    pub value: ParameterValue,
}

impl CommandPayload for ConfigurationReport {
    const DESCRIPTOR: &'static CommandDescriptor = &REPORT;

    fn to_command(&self) -> Result<Command> {
        Command::new(&REPORT)
            .with("ParameterNumber", self.parameter)?
            .with("ConfigurationValue", self.value.to_bytes())
    }

    fn from_fields(command: &Command) -> Result<Self> {
        Ok(Self {
            parameter: read_u8(command, "ParameterNumber")?,
            value: ParameterValue::from_bytes(
                "ConfigurationValue",
                command.bytes("ConfigurationValue")?,
            )?,
        })
    }
}
