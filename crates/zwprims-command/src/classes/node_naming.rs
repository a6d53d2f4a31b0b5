//! Node Naming and Location command class (0x77).

use crate::descriptor::CommandDescriptor;
use crate::field::{BitSpec, FieldSpec};

pub const CLASS_ID: u8 = 0x77;

static PRESENTATION: [BitSpec; 1] = [BitSpec::uint("Level.CharPresentation", 0x07)];

pub static NAME_SET: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x01,
    1,
    "NodeNameSet",
    &[
        FieldSpec::bits("Level", &PRESENTATION),
        FieldSpec::remainder("NodeName"),
    ],
);

pub static NAME_GET: CommandDescriptor =
    CommandDescriptor::new(CLASS_ID, 0x02, 1, "NodeNameGet", &[]);

pub static NAME_REPORT: CommandDescriptor = CommandDescriptor::new(
    CLASS_ID,
    0x03,
    1,
    "NodeNameReport",
    &[
        FieldSpec::bits("Level", &PRESENTATION),
        FieldSpec::remainder("NodeName"),
    ],
);

pub static DESCRIPTORS: [&CommandDescriptor; 3] = [&NAME_SET, &NAME_GET, &NAME_REPORT];
