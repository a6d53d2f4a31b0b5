use std::fmt;

/// Which deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// No ACK, NAK or CAN arrived for a transmitted frame.
    AckTimeout,
    /// A call's response or callback did not arrive in time.
    ResponseTimeout,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutKind::AckTimeout => f.write_str("ack timeout"),
            TimeoutKind::ResponseTimeout => f.write_str("response timeout"),
        }
    }
}

/// Why a transmitted frame has to be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    Nak,
    Can,
    Timeout(TimeoutKind),
}

impl fmt::Display for RetryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryCause::Nak => f.write_str("NAK"),
            RetryCause::Can => f.write_str("CAN"),
            RetryCause::Timeout(kind) => kind.fmt(f),
        }
    }
}

/// Errors that can occur in link and session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A call deadline expired.
    #[error("protocol timeout: {0}")]
    ProtocolTimeout(TimeoutKind),

    /// Every transmission attempt went unacknowledged.
    #[error("frame not acknowledged after {attempts} attempts (last: {last})")]
    RetryExhausted { attempts: u32, last: RetryCause },

    /// The link is closed; nothing further can be sent or received.
    #[error("transport closed")]
    TransportClosed,

    /// The requested callback id belongs to an outstanding call.
    #[error("callback id {0} is already outstanding")]
    DuplicateCallbackId(u8),

    /// Every callback id belongs to an outstanding call.
    #[error("all callback ids are outstanding")]
    CallbackIdsExhausted,

    /// The controller reported a failed transmission to the node.
    #[error("transmission failed with status {status:#04x}")]
    TransmitFailed { status: u8 },

    /// The controller refused the request.
    #[error("request rejected by controller")]
    Rejected,

    /// The controller answered with a frame that does not fit the request.
    #[error("malformed reply to {function}: {reason}")]
    MalformedReply {
        function: &'static str,
        reason: &'static str,
    },

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] zwprims_frame::FrameError),

    /// Command encode/decode error.
    #[error("command error: {0}")]
    Command(#[from] zwprims_command::CommandError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] zwprims_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
