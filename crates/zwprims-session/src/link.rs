//! Reliable, ordered, one-frame-at-a-time delivery over a byte stream.
//!
//! A [`Link`] owns two tasks. The reader classifies inbound bytes, asks the
//! writer to ACK good frames and NAK corrupt ones, and forwards frames
//! upward. The writer is the only task that touches the write half: it
//! transmits queued frames one at a time, waits for the handshake token and
//! retries on NAK, CAN or silence.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use zwprims_frame::{
    function_name, ControlToken, Frame, FrameConfig, FrameError, FrameReader, FrameWriter, Inbound,
    MAX_PAYLOAD,
};
use zwprims_transport::ByteStream;

use crate::error::{Result, RetryCause, SessionError, TimeoutKind};

/// Default wait for ACK/NAK/CAN after a frame is written.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(1500);

/// Default transmissions per frame, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts; attempt `n` waits `n` times this.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Default number of sends that may queue behind the one in flight.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Default number of received frames buffered for the consumer.
pub const DEFAULT_INBOUND_CAPACITY: usize = 64;

const SIGNAL_CAPACITY: usize = 16;

/// Configuration for a [`Link`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub ack_timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub queue_capacity: usize,
    pub inbound_capacity: usize,
    pub frame: FrameConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            frame: FrameConfig::default(),
        }
    }
}

/// Observable state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    AwaitingAck,
    /// Terminal. Both tasks have stopped or are stopping.
    Closed,
}

struct SendRequest {
    frame: Frame,
    done: oneshot::Sender<Result<()>>,
}

/// Reader to writer traffic.
#[derive(Debug, Clone, Copy)]
enum Signal {
    /// Put this token on the wire now.
    Reply(ControlToken),
    /// The peer sent this token.
    Received(ControlToken),
}

/// Handle to a running link. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Link {
    requests: mpsc::Sender<SendRequest>,
    state: watch::Receiver<LinkState>,
    shutdown: CancellationToken,
    max_payload: usize,
}

impl Link {
    /// Split `stream` and spawn the reader and writer tasks.
    ///
    /// Returns the handle and the receiver of checksum-verified inbound
    /// frames. Must be called inside a tokio runtime.
    pub fn spawn<S: ByteStream>(stream: S, config: LinkConfig) -> (Self, mpsc::Receiver<Frame>) {
        let (read_half, write_half) = tokio::io::split(stream);
        let (request_tx, request_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(LinkState::Idle);
        let shutdown = CancellationToken::new();
        let max_payload = config.frame.max_payload_size.min(MAX_PAYLOAD);

        let reader = FrameReader::with_config(read_half, config.frame.clone());
        tokio::spawn(run_reader(reader, signal_tx, inbound_tx, shutdown.clone()));

        let writer = WriterTask {
            writer: FrameWriter::with_config(write_half, config.frame.clone()),
            signals: signal_rx,
            state: state_tx,
            shutdown: shutdown.clone(),
            config,
        };
        tokio::spawn(writer.run(request_rx));
        debug!("link started");

        let link = Self {
            requests: request_tx,
            state: state_rx,
            shutdown,
            max_payload,
        };
        (link, inbound_rx)
    }

    /// Queue a frame and wait until the peer acknowledges it.
    ///
    /// Fails with [`SessionError::RetryExhausted`] when every attempt went
    /// unacknowledged; the link stays usable afterwards.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        if frame.payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.max_payload,
            }
            .into());
        }
        if self.shutdown.is_cancelled() {
            return Err(SessionError::TransportClosed);
        }

        let (done, result) = oneshot::channel();
        self.requests
            .send(SendRequest { frame, done })
            .await
            .map_err(|_| SessionError::TransportClosed)?;
        result.await.map_err(|_| SessionError::TransportClosed)?
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    /// Stop both tasks. Queued and in-flight sends fail with
    /// [`SessionError::TransportClosed`].
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            debug!("link close requested");
        }
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait until the link has reached [`LinkState::Closed`].
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|state| *state == LinkState::Closed).await;
    }
}

async fn run_reader<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    signals: mpsc::Sender<Signal>,
    inbound: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            item = reader.read_next() => item,
        };

        let signal = match item {
            Ok(Inbound::Frame(frame)) => {
                trace!(
                    function = function_name(frame.function_id),
                    kind = ?frame.kind,
                    len = frame.payload.len(),
                    "frame received"
                );
                if signals.send(Signal::Reply(ControlToken::Ack)).await.is_err() {
                    break;
                }
                if inbound.send(frame).await.is_err() {
                    trace!("inbound consumer gone, frame dropped");
                }
                continue;
            }
            Ok(Inbound::Invalid(reason)) => {
                warn!(%reason, "invalid frame dropped");
                Signal::Reply(ControlToken::Nak)
            }
            Ok(Inbound::Control(token)) => {
                trace!(?token, "control token received");
                Signal::Received(token)
            }
            Err(FrameError::ConnectionClosed) => {
                debug!("stream closed by peer");
                break;
            }
            Err(err) => {
                warn!(error = %err, "link read failed");
                break;
            }
        };
        if signals.send(signal).await.is_err() {
            break;
        }
    }
    shutdown.cancel();
}

enum Delivery {
    Acked,
    Failed(SessionError),
    Closed,
}

enum Wait {
    Token(ControlToken),
    Deadline,
    Closed,
}

struct WriterTask<W> {
    writer: FrameWriter<W>,
    signals: mpsc::Receiver<Signal>,
    state: watch::Sender<LinkState>,
    shutdown: CancellationToken,
    config: LinkConfig,
}

impl<W: AsyncWrite + Unpin> WriterTask<W> {
    async fn run(mut self, mut requests: mpsc::Receiver<SendRequest>) {
        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                signal = self.signals.recv() => match signal {
                    Some(Signal::Reply(token)) => {
                        if !self.reply(token).await {
                            break;
                        }
                    }
                    Some(Signal::Received(token)) => {
                        trace!(?token, "control token ignored while idle");
                    }
                    None => break,
                },
                request = requests.recv() => {
                    let Some(SendRequest { frame, done }) = request else {
                        break;
                    };
                    match self.deliver(&frame).await {
                        Delivery::Acked => {
                            self.state.send_replace(LinkState::Idle);
                            let _ = done.send(Ok(()));
                        }
                        Delivery::Failed(err) => {
                            self.state.send_replace(LinkState::Idle);
                            let _ = done.send(Err(err));
                        }
                        Delivery::Closed => {
                            let _ = done.send(Err(SessionError::TransportClosed));
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown.cancel();
        self.state.send_replace(LinkState::Closed);
        requests.close();
        while let Ok(request) = requests.try_recv() {
            let _ = request.done.send(Err(SessionError::TransportClosed));
        }
        debug!("link closed");
    }

    async fn deliver(&mut self, frame: &Frame) -> Delivery {
        let attempts = self.config.max_attempts.max(1);
        let function = function_name(frame.function_id);
        let mut last = RetryCause::Timeout(TimeoutKind::AckTimeout);

        for attempt in 1..=attempts {
            self.state.send_replace(LinkState::AwaitingAck);
            match self.writer.write_frame(frame).await {
                Ok(()) => {}
                Err(err @ FrameError::PayloadTooLarge { .. }) => return Delivery::Failed(err.into()),
                Err(err) => {
                    warn!(error = %err, "link write failed");
                    return Delivery::Closed;
                }
            }
            trace!(function, attempt, "frame written, awaiting ack");

            let deadline = Instant::now() + self.config.ack_timeout;
            last = match self.await_token(deadline).await {
                Wait::Token(ControlToken::Ack) => return Delivery::Acked,
                Wait::Token(ControlToken::Nak) => RetryCause::Nak,
                Wait::Token(ControlToken::Can) => RetryCause::Can,
                Wait::Deadline => RetryCause::Timeout(TimeoutKind::AckTimeout),
                Wait::Closed => return Delivery::Closed,
            };

            if attempt < attempts {
                debug!(function, attempt, cause = %last, "retrying frame");
                let resume = Instant::now() + self.config.retry_backoff * attempt;
                loop {
                    match self.await_token(resume).await {
                        Wait::Deadline => break,
                        Wait::Closed => return Delivery::Closed,
                        Wait::Token(token) => trace!(?token, "control token ignored during backoff"),
                    }
                }
            }
        }

        warn!(function, attempts, cause = %last, "frame not acknowledged, giving up");
        Delivery::Failed(SessionError::RetryExhausted { attempts, last })
    }

    /// Wait for the next token from the peer, answering the reader's
    /// ACK/NAK requests in the meantime.
    async fn await_token(&mut self, deadline: Instant) -> Wait {
        let shutdown = self.shutdown.clone();
        let sleep = sleep_until(deadline);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Wait::Closed,
                signal = self.signals.recv() => match signal {
                    Some(Signal::Reply(token)) => {
                        if !self.reply(token).await {
                            return Wait::Closed;
                        }
                    }
                    Some(Signal::Received(token)) => return Wait::Token(token),
                    None => return Wait::Closed,
                },
                _ = &mut sleep => return Wait::Deadline,
            }
        }
    }

    async fn reply(&mut self, token: ControlToken) -> bool {
        match self.writer.send_control(token).await {
            Ok(()) => {
                trace!(?token, "control token sent");
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to write control token");
                false
            }
        }
    }
}
