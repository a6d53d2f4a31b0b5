use crate::error::{CommandError, Result};
use crate::field::{BitKind, BitSpec, FieldKind, FieldSpec, FieldValue};

/// Identity of a command layout: class, command and protocol version.
pub type CommandKey = (u8, u8, u8);

/// The binary layout of one application command.
///
/// Descriptors are `const`-constructible so each command class can declare
/// them as statics; the registry validates them once at start-up.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub class_id: u8,
    pub command_id: u8,
    pub version: u8,
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

/// Shape of one value slot in a decoded command.
///
/// Bit groups contribute one slot per sub-field; every other field
/// contributes exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Uint { max: u32 },
    Flag,
    Bytes { width: Option<usize> },
}

impl Slot {
    fn of_field(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Uint { width } => Slot::Uint {
                max: uint_max(width),
            },
            FieldKind::Bytes { width } => Slot::Bytes { width: Some(width) },
            FieldKind::Variable { .. } | FieldKind::Marker { .. } | FieldKind::Remainder => {
                Slot::Bytes { width: None }
            }
            FieldKind::Bits(_) => Slot::Uint { max: 0 },
        }
    }

    fn of_bit(bit: &BitSpec) -> Self {
        match bit.kind {
            BitKind::Flag => Slot::Flag,
            BitKind::Uint => Slot::Uint {
                max: bit.max_value(),
            },
        }
    }

    pub(crate) fn default_value(self) -> FieldValue {
        match self {
            Slot::Uint { .. } => FieldValue::Uint(0),
            Slot::Flag => FieldValue::Flag(false),
            Slot::Bytes { width } => FieldValue::Bytes(vec![0; width.unwrap_or(0)]),
        }
    }

    pub(crate) fn expected(self) -> &'static str {
        match self {
            Slot::Uint { .. } => "integer",
            Slot::Flag => "flag",
            Slot::Bytes { .. } => "bytes",
        }
    }

    pub(crate) fn accepts(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (Slot::Uint { .. }, FieldValue::Uint(_))
                | (Slot::Flag, FieldValue::Flag(_))
                | (Slot::Bytes { .. }, FieldValue::Bytes(_))
        )
    }
}

pub(crate) fn uint_max(width: usize) -> u32 {
    match width {
        0 => 0,
        1..=3 => (1u32 << (8 * width)) - 1,
        _ => u32::MAX,
    }
}

fn field_slots(field: &FieldSpec) -> impl Iterator<Item = (&'static str, Slot)> {
    let bits: &'static [BitSpec] = match field.kind {
        FieldKind::Bits(bits) => bits,
        _ => &[],
    };
    let single = match field.kind {
        FieldKind::Bits(_) => None,
        kind => Some((field.name, Slot::of_field(kind))),
    };
    single
        .into_iter()
        .chain(bits.iter().map(|bit| (bit.name, Slot::of_bit(bit))))
}

impl CommandDescriptor {
    pub const fn new(
        class_id: u8,
        command_id: u8,
        version: u8,
        name: &'static str,
        fields: &'static [FieldSpec],
    ) -> Self {
        Self {
            class_id,
            command_id,
            version,
            name,
            fields,
        }
    }

    pub fn key(&self) -> CommandKey {
        (self.class_id, self.command_id, self.version)
    }

    /// Value slots in declaration order.
    pub(crate) fn slots(&self) -> impl Iterator<Item = (&'static str, Slot)> + '_ {
        self.fields.iter().flat_map(field_slots)
    }

    /// Names of every value a command of this layout carries, in wire order.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.slots().map(|(name, _)| name)
    }

    pub(crate) fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots().position(|(slot, _)| slot == name)
    }

    /// Check the schema is internally consistent.
    ///
    /// Rejects out-of-range widths, empty or overlapping bit groups, multi-bit
    /// flags, duplicate names, variable fields whose length source is not an
    /// earlier integer, and remainder fields that are not last.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| CommandError::InvalidDescriptor {
            descriptor: self.name,
            reason,
        };
        let mut seen: Vec<(&'static str, Slot)> = Vec::new();

        for (index, field) in self.fields.iter().enumerate() {
            match field.kind {
                FieldKind::Uint { width } if !(1..=4).contains(&width) => {
                    return Err(invalid(format!(
                        "{} width {width} outside 1..=4",
                        field.name
                    )));
                }
                FieldKind::Bytes { width: 0 } => {
                    return Err(invalid(format!("{} has zero width", field.name)));
                }
                FieldKind::Bits(bits) => {
                    if bits.is_empty() {
                        return Err(invalid(format!("{} has no sub-fields", field.name)));
                    }
                    let mut used = 0u8;
                    for bit in bits {
                        if bit.mask == 0 {
                            return Err(invalid(format!("{} has an empty mask", bit.name)));
                        }
                        if used & bit.mask != 0 {
                            return Err(invalid(format!("{} overlaps another sub-field", bit.name)));
                        }
                        if bit.kind == BitKind::Flag && bit.mask.count_ones() != 1 {
                            return Err(invalid(format!("flag {} spans several bits", bit.name)));
                        }
                        used |= bit.mask;
                    }
                }
                FieldKind::Variable { length_from } => {
                    match seen.iter().find(|(name, _)| *name == length_from) {
                        Some((_, Slot::Uint { .. })) => {}
                        Some(_) => {
                            return Err(invalid(format!(
                                "length source {length_from} of {} is not an integer",
                                field.name
                            )));
                        }
                        None => {
                            return Err(invalid(format!(
                                "length source {length_from} must precede {}",
                                field.name
                            )));
                        }
                    }
                }
                FieldKind::Remainder if index + 1 != self.fields.len() => {
                    return Err(invalid(format!("remainder {} is not last", field.name)));
                }
                _ => {}
            }

            for (name, slot) in field_slots(field) {
                if seen.iter().any(|(existing, _)| *existing == name) {
                    return Err(invalid(format!("duplicate field name {name}")));
                }
                seen.push((name, slot));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static LEVEL: [BitSpec; 2] = [
        BitSpec::uint("Level.Size", 0x07),
        BitSpec::flag("Level.Default", 0x80),
    ];

    static GOOD: CommandDescriptor = CommandDescriptor::new(
        0x70,
        0x04,
        1,
        "ConfigurationSet",
        &[
            FieldSpec::uint8("ParameterNumber"),
            FieldSpec::bits("Level", &LEVEL),
            FieldSpec::variable("ConfigurationValue", "Level.Size"),
        ],
    );

    fn reason(descriptor: &CommandDescriptor) -> String {
        match descriptor.validate() {
            Err(CommandError::InvalidDescriptor { reason, .. }) => reason,
            other => panic!("expected invalid descriptor, got {other:?}"),
        }
    }

    #[test]
    fn valid_descriptor_passes() {
        GOOD.validate().unwrap();
        let names: Vec<_> = GOOD.field_names().collect();
        assert_eq!(
            names,
            ["ParameterNumber", "Level.Size", "Level.Default", "ConfigurationValue"]
        );
        assert_eq!(GOOD.slot_index("ConfigurationValue"), Some(3));
        assert_eq!(GOOD.key(), (0x70, 0x04, 1));
    }

    #[test]
    fn length_source_must_precede() {
        static LATE: CommandDescriptor = CommandDescriptor::new(
            0x01,
            0x01,
            1,
            "Late",
            &[FieldSpec::variable("Data", "Length"), FieldSpec::uint8("Length")],
        );
        assert!(reason(&LATE).contains("must precede"));
    }

    #[test]
    fn length_source_must_be_integer() {
        static FLAG: [BitSpec; 1] = [BitSpec::flag("Flag", 0x01)];
        static BAD: CommandDescriptor = CommandDescriptor::new(
            0x01,
            0x01,
            1,
            "FlagLength",
            &[FieldSpec::bits("Props", &FLAG), FieldSpec::variable("Data", "Flag")],
        );
        assert!(reason(&BAD).contains("not an integer"));
    }

    #[test]
    fn remainder_must_be_last() {
        static BAD: CommandDescriptor = CommandDescriptor::new(
            0x01,
            0x01,
            1,
            "EarlyRemainder",
            &[FieldSpec::remainder("Rest"), FieldSpec::uint8("After")],
        );
        assert!(reason(&BAD).contains("not last"));
    }

    #[test]
    fn overlapping_bits_rejected() {
        static BITS: [BitSpec; 2] = [BitSpec::uint("Low", 0x0F), BitSpec::uint("Mid", 0x18)];
        static BAD: CommandDescriptor =
            CommandDescriptor::new(0x01, 0x01, 1, "Overlap", &[FieldSpec::bits("Props", &BITS)]);
        assert!(reason(&BAD).contains("overlaps"));
    }

    #[test]
    fn multi_bit_flag_rejected() {
        static BITS: [BitSpec; 1] = [BitSpec::flag("Wide", 0x03)];
        static BAD: CommandDescriptor =
            CommandDescriptor::new(0x01, 0x01, 1, "WideFlag", &[FieldSpec::bits("Props", &BITS)]);
        assert!(reason(&BAD).contains("spans several bits"));
    }

    #[test]
    fn widths_checked() {
        static WIDE: CommandDescriptor =
            CommandDescriptor::new(0x01, 0x01, 1, "Wide", &[FieldSpec::uint("Huge", 5)]);
        assert!(reason(&WIDE).contains("outside 1..=4"));

        static EMPTY: CommandDescriptor =
            CommandDescriptor::new(0x01, 0x01, 1, "Empty", &[FieldSpec::bytes("Nothing", 0)]);
        assert!(reason(&EMPTY).contains("zero width"));
    }

    #[test]
    fn duplicate_names_rejected() {
        static BAD: CommandDescriptor = CommandDescriptor::new(
            0x01,
            0x01,
            1,
            "Dup",
            &[FieldSpec::uint8("Value"), FieldSpec::uint8("Value")],
        );
        assert!(reason(&BAD).contains("duplicate"));
    }

    #[test]
    fn uint_max_by_width() {
        assert_eq!(uint_max(1), 0xFF);
        assert_eq!(uint_max(2), 0xFFFF);
        assert_eq!(uint_max(3), 0xFF_FFFF);
        assert_eq!(uint_max(4), u32::MAX);
    }
}
