//! Schema-driven walk between application payloads and [`Command`] values.
//!
//! Payloads always carry the class and command header bytes. Fields are read
//! in declaration order; a variable field takes its byte count from an
//! earlier integer slot, and on encode that slot is rewritten to match the
//! bytes actually supplied.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::command::Command;
use crate::descriptor::{uint_max, CommandDescriptor, Slot};
use crate::error::{CommandError, Result};
use crate::field::{BitKind, FieldKind, FieldValue};

/// Decode a payload against one descriptor. Trailing bytes are ignored.
pub fn decode(descriptor: &'static CommandDescriptor, payload: &[u8]) -> Result<Command> {
    decode_with(descriptor, payload, false)
}

/// Decode a payload, rejecting bytes left after the last field.
pub fn decode_strict(descriptor: &'static CommandDescriptor, payload: &[u8]) -> Result<Command> {
    decode_with(descriptor, payload, true)
}

pub(crate) fn decode_with(
    descriptor: &'static CommandDescriptor,
    payload: &[u8],
    strict: bool,
) -> Result<Command> {
    let (header, body) = match payload {
        [class_id, command_id, body @ ..] => ((*class_id, *command_id), body),
        _ => {
            return Err(CommandError::PayloadUnderflow {
                field: "header",
                needed: 2,
                available: payload.len(),
            })
        }
    };
    let expected = (descriptor.class_id, descriptor.command_id);
    if header != expected {
        return Err(CommandError::CommandMismatch {
            expected,
            actual: header,
        });
    }

    let mut cursor = Cursor::new(body);
    let mut values: Vec<FieldValue> = Vec::with_capacity(descriptor.fields.len());

    for field in descriptor.fields {
        match field.kind {
            FieldKind::Uint { width } => {
                let width = uint_width(descriptor, field.name, width)?;
                let bytes = cursor.take(field.name, width)?;
                let value = bytes
                    .iter()
                    .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte));
                values.push(FieldValue::Uint(value));
            }
            FieldKind::Bytes { width } => {
                let bytes = cursor.take(field.name, width)?;
                values.push(FieldValue::Bytes(bytes.to_vec()));
            }
            FieldKind::Bits(bits) => {
                let byte = cursor.take(field.name, 1)?[0];
                values.extend(bits.iter().map(|bit| bit.extract(byte)));
            }
            FieldKind::Variable { length_from } => {
                let length = descriptor
                    .slot_index(length_from)
                    .and_then(|index| values.get(index))
                    .and_then(FieldValue::as_uint)
                    .ok_or_else(|| CommandError::InvalidDescriptor {
                        descriptor: descriptor.name,
                        reason: format!("length source {length_from} unavailable"),
                    })?;
                let bytes = cursor.take(field.name, length as usize)?;
                values.push(FieldValue::Bytes(bytes.to_vec()));
            }
            FieldKind::Marker { sentinel } => {
                let bytes = cursor.take_until(field.name, sentinel)?;
                values.push(FieldValue::Bytes(bytes.to_vec()));
            }
            FieldKind::Remainder => {
                values.push(FieldValue::Bytes(cursor.take_rest().to_vec()));
            }
        }
    }

    let trailing = cursor.remaining();
    if trailing > 0 {
        if strict {
            return Err(CommandError::TrailingBytes {
                command: descriptor.name,
                count: trailing,
            });
        }
        trace!(command = descriptor.name, trailing, "ignoring trailing bytes");
    }

    Ok(Command::from_values(descriptor, values))
}

/// Encode a command to its payload bytes, header included.
pub fn encode(command: &Command) -> Result<Bytes> {
    let descriptor = command.descriptor();
    let mut values = command.values().to_vec();
    sync_lengths(descriptor, &mut values)?;

    let mut out = BytesMut::with_capacity(2 + descriptor.fields.len());
    out.put_u8(descriptor.class_id);
    out.put_u8(descriptor.command_id);

    let mut slots = values.iter();
    for field in descriptor.fields {
        match field.kind {
            FieldKind::Uint { width } => {
                let width = uint_width(descriptor, field.name, width)?;
                let value = next_uint(&mut slots, field.name)?;
                check_range(field.name, value, uint_max(width))?;
                out.put_slice(&value.to_be_bytes()[4 - width..]);
            }
            FieldKind::Bytes { width } => {
                let bytes = next_bytes(&mut slots, field.name)?;
                if bytes.len() != width {
                    return Err(CommandError::WidthMismatch {
                        field: field.name,
                        expected: width,
                        actual: bytes.len(),
                    });
                }
                out.put_slice(bytes);
            }
            FieldKind::Bits(bits) => {
                let mut byte = 0u8;
                for bit in bits {
                    let raw = match bit.kind {
                        BitKind::Flag => u32::from(next_flag(&mut slots, bit.name)?),
                        BitKind::Uint => {
                            let value = next_uint(&mut slots, bit.name)?;
                            check_range(bit.name, value, bit.max_value())?;
                            value
                        }
                    };
                    byte |= ((raw as u8) << bit.shift) & bit.mask;
                }
                out.put_u8(byte);
            }
            FieldKind::Variable { .. } | FieldKind::Remainder => {
                out.put_slice(next_bytes(&mut slots, field.name)?);
            }
            FieldKind::Marker { sentinel } => {
                let bytes = next_bytes(&mut slots, field.name)?;
                if bytes.contains(&sentinel) {
                    return Err(CommandError::SentinelInValue {
                        field: field.name,
                        sentinel,
                    });
                }
                out.put_slice(bytes);
                out.put_u8(sentinel);
            }
        }
    }

    Ok(out.freeze())
}

/// Rewrite every variable field's length source to the supplied byte count.
fn sync_lengths(descriptor: &CommandDescriptor, values: &mut [FieldValue]) -> Result<()> {
    let mut slot = 0usize;
    let mut updates = Vec::new();
    for field in descriptor.fields {
        match field.kind {
            FieldKind::Bits(bits) => slot += bits.len(),
            FieldKind::Variable { length_from } => {
                let length = values
                    .get(slot)
                    .and_then(FieldValue::as_bytes)
                    .map(<[u8]>::len)
                    .ok_or(CommandError::FieldTypeMismatch {
                        field: field.name,
                        expected: "bytes",
                    })?;
                updates.push((length_from, length));
                slot += 1;
            }
            _ => slot += 1,
        }
    }

    for (source, length) in updates {
        let index = descriptor
            .slot_index(source)
            .ok_or_else(|| CommandError::UnknownField(source.to_string()))?;
        let max = descriptor
            .slots()
            .nth(index)
            .map(|(_, slot)| match slot {
                Slot::Uint { max } => max,
                _ => 0,
            })
            .unwrap_or(0);
        let length = u32::try_from(length).unwrap_or(u32::MAX);
        check_range(source, length, max)?;
        values[index] = FieldValue::Uint(length);
    }
    Ok(())
}

/// Integer widths outside `1..=4` only reach here through unregistered descriptors.
fn uint_width(descriptor: &CommandDescriptor, field: &'static str, width: usize) -> Result<usize> {
    if (1..=4).contains(&width) {
        Ok(width)
    } else {
        Err(CommandError::InvalidDescriptor {
            descriptor: descriptor.name,
            reason: format!("{field} width {width} outside 1..=4"),
        })
    }
}

fn check_range(field: &'static str, value: u32, max: u32) -> Result<()> {
    if value > max {
        return Err(CommandError::FieldOverflow {
            field,
            value: u64::from(value),
            max: u64::from(max),
        });
    }
    Ok(())
}

fn next_value<'a>(
    slots: &mut std::slice::Iter<'a, FieldValue>,
    field: &'static str,
    expected: &'static str,
) -> Result<&'a FieldValue> {
    slots
        .next()
        .ok_or(CommandError::FieldTypeMismatch { field, expected })
}

fn next_uint(slots: &mut std::slice::Iter<'_, FieldValue>, field: &'static str) -> Result<u32> {
    next_value(slots, field, "integer")?
        .as_uint()
        .ok_or(CommandError::FieldTypeMismatch {
            field,
            expected: "integer",
        })
}

fn next_flag(slots: &mut std::slice::Iter<'_, FieldValue>, field: &'static str) -> Result<bool> {
    next_value(slots, field, "flag")?
        .as_flag()
        .ok_or(CommandError::FieldTypeMismatch {
            field,
            expected: "flag",
        })
}

fn next_bytes<'a>(
    slots: &mut std::slice::Iter<'a, FieldValue>,
    field: &'static str,
) -> Result<&'a [u8]> {
    next_value(slots, field, "bytes")?
        .as_bytes()
        .ok_or(CommandError::FieldTypeMismatch {
            field,
            expected: "bytes",
        })
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, field: &'static str, count: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if count > available {
            return Err(CommandError::PayloadUnderflow {
                field,
                needed: count,
                available,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    /// Bytes before `sentinel`; the sentinel itself is consumed.
    fn take_until(&mut self, field: &'static str, sentinel: u8) -> Result<&'a [u8]> {
        let rest = &self.buf[self.pos..];
        let end = rest
            .iter()
            .position(|byte| *byte == sentinel)
            .ok_or(CommandError::UnterminatedVariableField { field, sentinel })?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    fn take_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }
}
