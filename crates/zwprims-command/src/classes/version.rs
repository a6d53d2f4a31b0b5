//! Version command class (0x86).

use serde::Serialize;

use crate::command::Command;
use crate::descriptor::CommandDescriptor;
use crate::error::Result;
use crate::field::FieldSpec;
use crate::payload::{read_u8, CommandPayload};

pub const CLASS_ID: u8 = 0x86;

pub static GET: CommandDescriptor = CommandDescriptor::new(CLASS_ID, 0x11, 1, "VersionGet", &[]);

pub static REPORT: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x12,
    1,
    "VersionReport",
    &[
        FieldSpec::uint8("LibraryType"),
        FieldSpec::uint8("ProtocolVersion"),
        FieldSpec::uint8("ProtocolSubVersion"),
        FieldSpec::uint8("ApplicationVersion"),
        FieldSpec::uint8("ApplicationSubVersion"),
    ],
);

pub static COMMAND_CLASS_GET: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x13,
    1,
    "VersionCommandClassGet",
    &[FieldSpec::uint8("RequestedCommandClass")],
);

pub static COMMAND_CLASS_REPORT: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x14,
    1,
    "VersionCommandClassReport",
    &[
        FieldSpec::uint8("RequestedCommandClass"),
        FieldSpec::uint8("CommandClassVersion"),
    ],
);

pub static DESCRIPTORS: [&CommandDescriptor; 4] =
    [&GET, &REPORT, &COMMAND_CLASS_GET, &COMMAND_CLASS_REPORT];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionCommandClassGet {
    pub requested_class: u8,
}

impl CommandPayload for VersionCommandClassGet {
    const DESCRIPTOR: &'static CommandDescriptor = &COMMAND_CLASS_GET;

    fn to_command(&self) -> Result<Command> {
        Command::new(&COMMAND_CLASS_GET).with("RequestedCommandClass", self.requested_class)
    }

    fn from_fields(command: &Command) -> Result<Self> {
        Ok(Self {
            requested_class: read_u8(command, "RequestedCommandClass")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionCommandClassReport {
    pub requested_class: u8,
    pub version: u8,
}

impl CommandPayload for VersionCommandClassReport {
    const DESCRIPTOR: &'static CommandDescriptor = &COMMAND_CLASS_REPORT;

    fn to_command(&self) -> Result<Command> {
        Command::new(&COMMAND_CLASS_REPORT)
            .with("RequestedCommandClass", self.requested_class)?
            .with("CommandClassVersion", self.version)
    }

    fn from_fields(command: &Command) -> Result<Self> {
        Ok(Self {
            requested_class: read_u8(command, "RequestedCommandClass")?,
            version: read_u8(command, "CommandClassVersion")?,
        })
    }
}
