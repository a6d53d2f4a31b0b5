//! Checksummed serial-API framing.
//!
//! Every data frame on the wire is:
//! - a start-of-frame byte (`0x01`)
//! - a length byte covering type, function id, payload and checksum
//! - a type byte (request or response) and a function id
//! - the payload and an XOR checksum
//!
//! Single `ACK`/`NAK`/`CAN` bytes between frames are handshake signals and
//! are surfaced as [`ControlToken`]s. Anything else between frames is noise.

pub mod codec;
pub mod error;
pub mod function;
pub mod reader;
pub mod writer;

pub use codec::{
    checksum, encode_frame, try_decode, ControlToken, Decoded, Frame, FrameConfig, FrameKind,
    Inbound, Outbound, SerialCodec, ACK, CAN, MAX_PAYLOAD, NAK, SOF,
};
pub use error::{FrameError, InvalidFrame, Result};
pub use function::function_name;
pub use reader::FrameReader;
pub use writer::FrameWriter;
