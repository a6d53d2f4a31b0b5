/// Errors that can occur while encoding, decoding or registering commands.
///
/// A decode failure affects one message only; it never says anything about
/// the health of the link that carried it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The payload ended before a field could be read.
    #[error("payload underflow at {field}: need {needed} bytes, {available} available")]
    PayloadUnderflow {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    /// A marker-terminated field ran to the end of the payload.
    #[error("field {field} is not terminated by {sentinel:#04x}")]
    UnterminatedVariableField { field: &'static str, sentinel: u8 },

    /// No descriptor is registered for this class/command pair.
    #[error("unknown command {command_id:#04x} in class {class_id:#04x}")]
    UnknownCommand { class_id: u8, command_id: u8 },

    /// The payload header names a different command than the descriptor.
    #[error(
        "command header mismatch: expected {:#04x}/{:#04x}, got {:#04x}/{:#04x}",
        .expected.0, .expected.1, .actual.0, .actual.1
    )]
    CommandMismatch { expected: (u8, u8), actual: (u8, u8) },

    /// Bytes remained after the last field while strict decoding was on.
    #[error("{count} trailing bytes after {command}")]
    TrailingBytes { command: &'static str, count: usize },

    /// A value does not fit the bits or bytes reserved for it.
    #[error("value {value} does not fit {field} (max {max})")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// A fixed-width byte field holds the wrong number of bytes.
    #[error("field {field} must be {expected} bytes, got {actual}")]
    WidthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A marker-terminated value contains its own sentinel.
    #[error("field {field} contains its terminator {sentinel:#04x}")]
    SentinelInValue { field: &'static str, sentinel: u8 },

    /// The command has no field with this name.
    #[error("no field named {0}")]
    UnknownField(String),

    /// A value of the wrong shape was supplied or requested for a field.
    #[error("field {field} expects {expected}")]
    FieldTypeMismatch {
        field: &'static str,
        expected: &'static str,
    },

    /// A descriptor's field schema is inconsistent.
    #[error("invalid descriptor {descriptor}: {reason}")]
    InvalidDescriptor {
        descriptor: &'static str,
        reason: String,
    },

    /// A descriptor was registered twice for the same class, command and version.
    #[error("duplicate descriptor for {class_id:#04x}/{command_id:#04x} v{version}")]
    DuplicateDescriptor {
        class_id: u8,
        command_id: u8,
        version: u8,
    },
}

pub type Result<T> = std::result::Result<T, CommandError>;
