//! Schema-driven codec for application command classes.
//!
//! Each command is described by a static [`CommandDescriptor`]: an ordered
//! list of integer, byte, bit-packed, length-prefixed, marker-terminated and
//! remainder fields. One generic walker decodes and encodes every descriptor,
//! and a [`CommandRegistry`] picks the right descriptor (and version) for an
//! incoming payload.
//!
//! Hand-written typed payloads sit on top through [`CommandPayload`].

pub mod classes;
pub mod codec;
pub mod command;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod field;
pub mod payload;
pub mod registry;

pub use classes::{standard_registry, standard_registry_with_config};
pub use codec::{decode, decode_strict, encode};
pub use command::{Command, Message, RawCommand};
pub use config::RegistryConfig;
pub use descriptor::{CommandDescriptor, CommandKey};
pub use error::{CommandError, Result};
pub use field::{BitKind, BitSpec, FieldKind, FieldSpec, FieldValue};
pub use payload::CommandPayload;
pub use registry::{CommandRegistry, RegistryBuilder};
