//! Controller sessions over the serial API.
//!
//! Layered on top of the frame codec:
//! - [`Link`]: ACK/NAK/CAN handshake with bounded retransmission, one frame
//!   in flight at a time
//! - [`Session`]: correlates requests with their responses and callbacks,
//!   fans unclaimed frames out to subscribers
//! - [`Controller`]: application commands to and from nodes, encoded through
//!   a [`CommandRegistry`](zwprims_command::CommandRegistry)

mod callback;
#[cfg(unix)]
pub mod connector;
pub mod controller;
pub mod error;
pub mod link;
mod pending;
pub mod session;
pub mod subscription;

#[cfg(test)]
mod testing;

#[cfg(unix)]
pub use connector::{connect_bridge, open_serial};
pub use controller::{
    parse_application_command, ApplicationEvent, ApplicationEventStream, Controller,
    ControllerVersion, NetworkId, TransmitOptions,
};
pub use error::{Result, RetryCause, SessionError, TimeoutKind};
pub use link::{Link, LinkConfig, LinkState, DEFAULT_ACK_TIMEOUT, DEFAULT_MAX_ATTEMPTS};
pub use session::{
    CallOutcome, Expect, Request, Session, SessionConfig, DEFAULT_CALL_TIMEOUT,
    DEFAULT_EVENT_CAPACITY,
};
pub use subscription::EventStream;
