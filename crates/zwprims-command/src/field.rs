//! Field schema elements and the values they decode to.

use serde::Serialize;

/// How a bit-packed sub-field is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitKind {
    /// Single-bit boolean.
    Flag,
    /// Unsigned integer occupying the masked bits.
    Uint,
}

/// A named sub-field inside one containing byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSpec {
    pub name: &'static str,
    pub mask: u8,
    pub shift: u8,
    pub kind: BitKind,
}

impl BitSpec {
    /// Boolean sub-field; `mask` must select exactly one bit.
    pub const fn flag(name: &'static str, mask: u8) -> Self {
        Self {
            name,
            mask,
            shift: mask.trailing_zeros() as u8,
            kind: BitKind::Flag,
        }
    }

    /// Integer sub-field spanning `mask`, shifted down to bit zero.
    pub const fn uint(name: &'static str, mask: u8) -> Self {
        Self {
            name,
            mask,
            shift: mask.trailing_zeros() as u8,
            kind: BitKind::Uint,
        }
    }

    /// Largest value the sub-field can hold.
    pub fn max_value(&self) -> u32 {
        u32::from(self.mask.checked_shr(u32::from(self.shift)).unwrap_or(0))
    }

    pub(crate) fn extract(&self, byte: u8) -> FieldValue {
        let raw = (byte & self.mask)
            .checked_shr(u32::from(self.shift))
            .unwrap_or(0);
        match self.kind {
            BitKind::Flag => FieldValue::Flag(raw != 0),
            BitKind::Uint => FieldValue::Uint(u32::from(raw)),
        }
    }
}

/// Layout of one schema element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Big-endian unsigned integer, 1 to 4 bytes.
    Uint { width: usize },
    /// Fixed number of raw bytes.
    Bytes { width: usize },
    /// One byte split into named sub-fields.
    Bits(&'static [BitSpec]),
    /// Raw bytes whose count is the value of an earlier scalar field.
    Variable { length_from: &'static str },
    /// Raw bytes up to (not including) a sentinel byte, which is consumed.
    Marker { sentinel: u8 },
    /// Every byte left in the payload.
    Remainder,
}

/// One element of a descriptor's ordered field schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name; for bit groups this names the containing byte only.
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn uint8(name: &'static str) -> Self {
        Self::uint(name, 1)
    }

    pub const fn uint16(name: &'static str) -> Self {
        Self::uint(name, 2)
    }

    pub const fn uint(name: &'static str, width: usize) -> Self {
        Self {
            name,
            kind: FieldKind::Uint { width },
        }
    }

    pub const fn bytes(name: &'static str, width: usize) -> Self {
        Self {
            name,
            kind: FieldKind::Bytes { width },
        }
    }

    pub const fn bits(name: &'static str, bits: &'static [BitSpec]) -> Self {
        Self {
            name,
            kind: FieldKind::Bits(bits),
        }
    }

    pub const fn variable(name: &'static str, length_from: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Variable { length_from },
        }
    }

    pub const fn marker(name: &'static str, sentinel: u8) -> Self {
        Self {
            name,
            kind: FieldKind::Marker { sentinel },
        }
    }

    pub const fn remainder(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Remainder,
        }
    }

    /// Bytes this field needs before it can be read.
    pub fn min_width(&self) -> usize {
        match self.kind {
            FieldKind::Uint { width } | FieldKind::Bytes { width } => width,
            FieldKind::Bits(_) => 1,
            FieldKind::Variable { .. } | FieldKind::Marker { .. } | FieldKind::Remainder => 0,
        }
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Uint(u32),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u32> {
        match self {
            FieldValue::Uint(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

impl From<u8> for FieldValue {
    fn from(value: u8) -> Self {
        FieldValue::Uint(u32::from(value))
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        FieldValue::Uint(u32::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Uint(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

impl From<&[u8]> for FieldValue {
    fn from(value: &[u8]) -> Self {
        FieldValue::Bytes(value.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for FieldValue {
    fn from(value: [u8; N]) -> Self {
        FieldValue::Bytes(value.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_spec_derives_shift_from_mask() {
        let size = BitSpec::uint("Level.Size", 0x07);
        assert_eq!(size.shift, 0);
        assert_eq!(size.max_value(), 7);

        let precision = BitSpec::uint("Precision", 0xE0);
        assert_eq!(precision.shift, 5);
        assert_eq!(precision.max_value(), 7);
        assert_eq!(precision.extract(0b1010_0011), FieldValue::Uint(5));
    }

    #[test]
    fn flag_extracts_single_bit() {
        let dynamic = BitSpec::flag("Dynamic", 0x80);
        assert_eq!(dynamic.extract(0x80), FieldValue::Flag(true));
        assert_eq!(dynamic.extract(0x7F), FieldValue::Flag(false));
    }

    #[test]
    fn values_serialize_untagged() {
        let json = serde_json::to_string(&vec![
            FieldValue::Flag(true),
            FieldValue::Uint(300),
            FieldValue::Bytes(vec![1, 2]),
        ])
        .unwrap();
        assert_eq!(json, "[true,300,[1,2]]");
    }
}
