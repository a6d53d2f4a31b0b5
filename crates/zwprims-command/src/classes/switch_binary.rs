//! Binary Switch command class (0x25).

use crate::command::Command;
use crate::descriptor::CommandDescriptor;
use crate::error::Result;
use crate::field::FieldSpec;
use crate::payload::{read_u8, CommandPayload};

pub const CLASS_ID: u8 = 0x25;

pub static SET: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x01,
    1,
    "SwitchBinarySet",
    &[FieldSpec::uint8("TargetValue")],
);

pub static GET: CommandDescriptor =
    CommandDescriptor::new(CLASS_ID, 0x02, 1, "SwitchBinaryGet", &[]);

pub static REPORT: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x03,
    1,
    "SwitchBinaryReport",
    &[FieldSpec::uint8("CurrentValue")],
);

pub static DESCRIPTORS: [&CommandDescriptor; 3] = [&SET, &GET, &REPORT];

const ON: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchBinarySet {
    pub on: bool,
}

impl CommandPayload for SwitchBinarySet {
    const DESCRIPTOR: &'static CommandDescriptor = &SET;

    fn to_command(&self) -> Result<Command> {
        Command::new(&SET).with("TargetValue", if self.on { ON } else { 0 })
    }

    fn from_fields(command: &Command) -> Result<Self> {
        Ok(Self {
            on: read_u8(command, "TargetValue")? != 0,
        })
    }
}

/// Reported state; any non-zero level counts as on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchBinaryReport {
    pub current_value: u8,
}

impl SwitchBinaryReport {
    pub fn is_on(&self) -> bool {
        self.current_value != 0
    }
}

impl CommandPayload for SwitchBinaryReport {
    const DESCRIPTOR: &'static CommandDescriptor = &REPORT;

    fn to_command(&self) -> Result<Command> {
        Command::new(&REPORT).with("CurrentValue", self.current_value)
    }

    fn from_fields(command: &Command) -> Result<Self> {
        Ok(Self {
            current_value: read_u8(command, "CurrentValue")?,
        })
    }
}
