//! Manufacturer Specific command class (0x72).

use serde::Serialize;

use crate::command::Command;
use crate::descriptor::CommandDescriptor;
use crate::error::Result;
use crate::field::FieldSpec;
use crate::payload::{read_u16, CommandPayload};

pub const CLASS_ID: u8 = 0x72;

pub static GET: CommandDescriptor =
    CommandDescriptor::new(CLASS_ID, 0x04, 1, "ManufacturerSpecificGet", &[]);

pub static REPORT: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x05,
    1,
    "ManufacturerSpecificReport",
    &[
        FieldSpec::uint16("ManufacturerId"),
        FieldSpec::uint16("ProductTypeId"),
        FieldSpec::uint16("ProductId"),
    ],
);

pub static DESCRIPTORS: [&CommandDescriptor; 2] = [&GET, &REPORT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManufacturerSpecificReport {
    pub manufacturer_id: u16,
    pub product_type_id: u16,
    pub product_id: u16,
}

impl CommandPayload for ManufacturerSpecificReport {
    const DESCRIPTOR: &'static CommandDescriptor = &REPORT;

    fn to_command(&self) -> Result<Command> {
        Command::new(&REPORT)
            .with("ManufacturerId", self.manufacturer_id)?
            .with("ProductTypeId", self.product_type_id)?
            .with("ProductId", self.product_id)
    }

    fn from_fields(command: &Command) -> Result<Self> {
        Ok(Self {
            manufacturer_id: read_u16(command, "ManufacturerId")?,
            product_type_id: read_u16(command, "ProductTypeId")?,
            product_id: read_u16(command, "ProductId")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_big_endian_ids() {
        let bytes = [0x72, 0x05, 0x00, 0x86, 0x00, 0x03, 0x00, 0x64];
        let report = ManufacturerSpecificReport::decode(&bytes).unwrap();
        assert_eq!(report.manufacturer_id, 0x0086);
        assert_eq!(report.product_type_id, 0x0003);
        assert_eq!(report.product_id, 0x0064);
        assert_eq!(report.encode().unwrap().as_ref(), &bytes);
    }
}
