//! Command-level API: send application commands to nodes and receive the
//! ones nodes send back.

use std::fmt;
use std::ops::BitOr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use futures_core::Stream;
use serde::Serialize;
use tracing::{debug, warn};
use zwprims_command::{Command, CommandError, CommandPayload, CommandRegistry, Message};
use zwprims_frame::function::{
    APPLICATION_COMMAND_HANDLER, GET_VERSION, MEMORY_GET_ID, SEND_DATA,
};
use zwprims_frame::{Frame, FrameError, FrameKind, MAX_PAYLOAD};

use crate::error::{Result, SessionError};
use crate::session::{Expect, Request, Session};
use crate::subscription::EventStream;

/// Transmit option bits for `SendData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransmitOptions(u8);

impl TransmitOptions {
    pub const NONE: Self = Self(0x00);
    /// Ask the node for a routed acknowledgement.
    pub const ACK: Self = Self(0x01);
    pub const LOW_POWER: Self = Self(0x02);
    pub const AUTO_ROUTE: Self = Self(0x04);
    pub const NO_ROUTE: Self = Self(0x10);
    /// Allow explorer frames when routing fails.
    pub const EXPLORE: Self = Self(0x20);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for TransmitOptions {
    fn default() -> Self {
        Self::ACK | Self::AUTO_ROUTE | Self::EXPLORE
    }
}

impl BitOr for TransmitOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// An application command received from a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationEvent {
    /// Source node.
    pub node_id: u8,
    /// Receive status bits as reported by the controller.
    pub rx_status: u8,
    pub message: Message,
}

/// Library identification returned by `GetVersion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerVersion {
    /// e.g. `"Z-Wave 4.05"`.
    pub library: String,
    pub library_type: u8,
}

/// Network identity returned by `MemoryGetId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkId {
    pub home_id: u32,
    pub node_id: u8,
}

/// Talks to nodes through a [`Session`], encoding and decoding application
/// commands with a shared [`CommandRegistry`].
#[derive(Debug, Clone)]
pub struct Controller {
    session: Session,
    registry: Arc<CommandRegistry>,
    timeout: Duration,
}

impl Controller {
    pub fn new(session: Session, registry: Arc<CommandRegistry>) -> Self {
        let timeout = session.config().default_timeout;
        Self {
            session,
            registry,
            timeout,
        }
    }

    /// Override the deadline used for every call this controller makes.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Send a command to a node and wait for the transmit report.
    ///
    /// Fails with [`SessionError::Rejected`] when the controller refuses the
    /// request and [`SessionError::TransmitFailed`] when the node could not
    /// be reached.
    pub async fn send_command(
        &self,
        node_id: u8,
        command: &Command,
        options: TransmitOptions,
    ) -> Result<()> {
        let encoded = command.encode()?;
        let len = u8::try_from(encoded.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: encoded.len(),
            max: MAX_PAYLOAD,
        })?;

        let mut payload = BytesMut::with_capacity(encoded.len() + 3);
        payload.put_u8(node_id);
        payload.put_u8(len);
        payload.put_slice(&encoded);
        payload.put_u8(options.bits());

        let request = Request::new(SEND_DATA, payload.freeze())
            .expect(Expect::ResponseAndCallback)
            .finish_on_response(refused);
        let outcome = self.session.call(request, self.timeout).await?;

        let accepted = outcome
            .response
            .as_ref()
            .and_then(|response| response.payload.first().copied())
            .ok_or(SessionError::MalformedReply {
                function: "SendData",
                reason: "empty response",
            })?;
        if accepted == 0 {
            warn!(node_id, command = command.name(), "controller rejected SendData");
            return Err(SessionError::Rejected);
        }

        let status = outcome
            .callback
            .as_ref()
            .and_then(|callback| callback.payload.get(1).copied())
            .ok_or(SessionError::MalformedReply {
                function: "SendData",
                reason: "callback without transmit status",
            })?;
        if status != 0 {
            warn!(node_id, command = command.name(), status, "transmission failed");
            return Err(SessionError::TransmitFailed { status });
        }

        debug!(node_id, command = command.name(), "command delivered");
        Ok(())
    }

    /// Typed form of [`Controller::send_command`].
    pub async fn send_payload<P: CommandPayload>(
        &self,
        node_id: u8,
        payload: &P,
        options: TransmitOptions,
    ) -> Result<()> {
        let command = payload.to_command()?;
        self.send_command(node_id, &command, options).await
    }

    /// Application commands sent by nodes, optionally limited to one
    /// command class.
    ///
    /// A payload that fails to decode is reported to this stream only.
    pub fn subscribe_events(&self, class_filter: Option<u8>) -> ApplicationEventStream {
        let events = self.session.subscribe(move |frame| {
            frame.kind == FrameKind::Request
                && frame.function_id == APPLICATION_COMMAND_HANDLER
                && class_filter.map_or(true, |class_id| frame.payload.get(3) == Some(&class_id))
        });
        ApplicationEventStream {
            events,
            registry: self.registry.clone(),
        }
    }

    /// Controller library version and type.
    pub async fn version(&self) -> Result<ControllerVersion> {
        let response = self.request(GET_VERSION, "GetVersion").await?;
        let payload = response.payload.as_ref();
        let end = payload
            .iter()
            .position(|byte| *byte == 0)
            .ok_or(SessionError::MalformedReply {
                function: "GetVersion",
                reason: "unterminated library string",
            })?;
        let library_type = *payload.get(end + 1).ok_or(SessionError::MalformedReply {
            function: "GetVersion",
            reason: "missing library type",
        })?;
        Ok(ControllerVersion {
            library: String::from_utf8_lossy(&payload[..end]).into_owned(),
            library_type,
        })
    }

    /// Home id and the controller's own node id.
    pub async fn network_id(&self) -> Result<NetworkId> {
        let response = self.request(MEMORY_GET_ID, "MemoryGetId").await?;
        match *response.payload.as_ref() {
            [a, b, c, d, node_id, ..] => Ok(NetworkId {
                home_id: u32::from_be_bytes([a, b, c, d]),
                node_id,
            }),
            _ => Err(SessionError::MalformedReply {
                function: "MemoryGetId",
                reason: "response shorter than 5 bytes",
            }),
        }
    }

    async fn request(&self, function_id: u8, function: &'static str) -> Result<Frame> {
        let outcome = self
            .session
            .call(Request::new(function_id, Vec::new()), self.timeout)
            .await?;
        outcome.response.ok_or(SessionError::MalformedReply {
            function,
            reason: "missing response",
        })
    }
}

fn refused(response: &Frame) -> bool {
    response.payload.first() == Some(&0)
}

/// Parse an `ApplicationCommandHandler` frame:
/// `[rx_status][source node][length][command bytes...]`.
pub fn parse_application_command(
    frame: &Frame,
    registry: &CommandRegistry,
) -> std::result::Result<ApplicationEvent, CommandError> {
    let (rx_status, node_id, len, rest) = match frame.payload.as_ref() {
        [rx_status, node_id, len, rest @ ..] => (*rx_status, *node_id, usize::from(*len), rest),
        payload => {
            return Err(CommandError::PayloadUnderflow {
                field: "ApplicationCommandHandler",
                needed: 3,
                available: payload.len(),
            })
        }
    };
    let command = rest.get(..len).ok_or(CommandError::PayloadUnderflow {
        field: "command",
        needed: len,
        available: rest.len(),
    })?;
    Ok(ApplicationEvent {
        node_id,
        rx_status,
        message: registry.decode(command)?,
    })
}

/// Stream of decoded application commands.
pub struct ApplicationEventStream {
    events: EventStream,
    registry: Arc<CommandRegistry>,
}

impl Stream for ApplicationEventStream {
    type Item = std::result::Result<ApplicationEvent, CommandError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        match Pin::new(&mut this.events).poll_next(cx) {
            Poll::Ready(Some(frame)) => {
                let event = parse_application_command(&frame, &this.registry);
                if let Err(err) = &event {
                    debug!(error = %err, "application command failed to decode");
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for ApplicationEventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationEventStream")
            .field("events", &self.events)
            .finish()
    }
}
