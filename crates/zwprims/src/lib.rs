//! Controller-side driver for the Z-Wave serial API.
//!
//! zwprims turns a raw serial line into reliably delivered frames, matches
//! replies and callbacks to the calls that caused them, and encodes
//! application commands from declarative descriptors.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte streams (tty devices, Unix socket bridges)
//! - [`frame`]: wire framing, checksum, ACK/NAK/CAN tokens
//! - [`command`]: command descriptors, codec and registry
//! - [`session`]: reliable link, call correlation, event streams (behind the
//!   `session` feature, on by default)
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(all(unix, feature = "session"))]
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use zwprims::command::classes::switch_binary::SwitchBinarySet;
//! use zwprims::command::standard_registry;
//! use zwprims::session::{open_serial, Controller, SessionConfig, TransmitOptions};
//! use zwprims::transport::SerialConfig;
//!
//! let session = open_serial("/dev/ttyACM0", &SerialConfig::default(), SessionConfig::default())?;
//! let controller = Controller::new(session, Arc::new(standard_registry()?));
//! controller
//!     .send_payload(5, &SwitchBinarySet { on: true }, TransmitOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

/// Re-export transport types.
pub mod transport {
    pub use zwprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use zwprims_frame::*;
}

/// Re-export command codec types.
pub mod command {
    pub use zwprims_command::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use zwprims_session::*;
}
