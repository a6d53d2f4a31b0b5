//! Multi Channel Association command class (0x8E).
//!
//! Plain node ids run up to a 0x00 marker; endpoint pairs fill the rest.

use crate::descriptor::CommandDescriptor;
use crate::field::FieldSpec;

pub const CLASS_ID: u8 = 0x8E;

pub const MARKER: u8 = 0x00;

pub static SET: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x01,
    2,
    "MultiChannelAssociationSet",
    &[
        FieldSpec::uint8("GroupingIdentifier"),
        FieldSpec::marker("NodeIds", MARKER),
        FieldSpec::remainder("MultiChannelNodes"),
    ],
);

pub static GET: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x02,
    2,
    "MultiChannelAssociationGet",
    &[FieldSpec::uint8("GroupingIdentifier")],
);

pub static REPORT: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x03,
    2,
    "MultiChannelAssociationReport",
    &[
        FieldSpec::uint8("GroupingIdentifier"),
        FieldSpec::uint8("MaxNodesSupported"),
        FieldSpec::uint8("ReportsToFollow"),
        FieldSpec::marker("NodeIds", MARKER),
        FieldSpec::remainder("MultiChannelNodes"),
    ],
);

pub static DESCRIPTORS: [&CommandDescriptor; 3] = [&SET, &GET, &REPORT];
