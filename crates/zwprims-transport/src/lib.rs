//! Byte transport for serial-API controllers.
//!
//! Provides the duplex byte stream every upper layer runs on:
//! - USB/UART controller sticks opened as tty devices (raw 8N1)
//! - Controllers exposed through a Unix socket bridge (socat, ser2net-style relays)
//!
//! This is the lowest layer of zwprims. It imposes no framing of its own;
//! everything else builds on the [`ByteStream`] trait and the [`SerialStream`]
//! type provided here.

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod serial;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::{ByteStream, SerialStream};

#[cfg(unix)]
pub use serial::{SerialConfig, SerialPort, DEFAULT_BAUD_RATE};
#[cfg(unix)]
pub use uds::UnixBridge;
