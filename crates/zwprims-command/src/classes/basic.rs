//! Basic command class (0x20).

use crate::command::Command;
use crate::descriptor::CommandDescriptor;
use crate::error::Result;
use crate::field::FieldSpec;
use crate::payload::{read_u8, CommandPayload};

pub const CLASS_ID: u8 = 0x20;

pub static SET: CommandDescriptor =
    CommandDescriptor::new(CLASS_ID, 0x01, 1, "BasicSet", &[FieldSpec::uint8("Value")]);

pub static GET: CommandDescriptor = CommandDescriptor::new(CLASS_ID, 0x02, 1, "BasicGet", &[]);

pub static REPORT_V1: CommandDescriptor =
    CommandDescriptor::new(CLASS_ID, 0x03, 1, "BasicReport", &[FieldSpec::uint8("Value")]);

pub static REPORT_V2: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x03,
    2,
    "BasicReport",
    &[
        FieldSpec::uint8("CurrentValue"),
        FieldSpec::uint8("TargetValue"),
        FieldSpec::uint8("Duration"),
    ],
);

pub static DESCRIPTORS: [&CommandDescriptor; 4] = [&SET, &GET, &REPORT_V1, &REPORT_V2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicSet {
    pub value: u8,
}

impl CommandPayload for BasicSet {
    const DESCRIPTOR: &'static CommandDescriptor = &SET;

    fn to_command(&self) -> Result<Command> {
        Command::new(&SET).with("Value", self.value)
    }

    fn from_fields(command: &Command) -> Result<Self> {
        Ok(Self {
            value: read_u8(command, "Value")?,
        })
    }
}
