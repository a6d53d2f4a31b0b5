//! Request/response correlation on top of a [`Link`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{debug, trace};
use zwprims_frame::function::is_unsolicited;
use zwprims_frame::{function_name, Frame};
use zwprims_transport::ByteStream;

use crate::error::{Result, SessionError, TimeoutKind};
use crate::link::{Link, LinkConfig, LinkState};
use crate::pending::{PendingGuard, PendingTable};
use crate::subscription::EventStream;

/// Default deadline for [`Session::call_default`].
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-subscriber buffer before old frames are skipped.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub default_timeout: Duration,
    pub event_capacity: usize,
    pub link: LinkConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_CALL_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            link: LinkConfig::default(),
        }
    }
}

/// Which inbound frames complete a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Done once the controller ACKs the request.
    Nothing,
    /// A Response frame with the same function id.
    Response,
    /// A Request frame with the same function id carrying the callback id.
    Callback,
    /// Both, in either order.
    ResponseAndCallback,
}

impl Expect {
    pub fn wants_response(self) -> bool {
        matches!(self, Expect::Response | Expect::ResponseAndCallback)
    }

    pub fn wants_callback(self) -> bool {
        matches!(self, Expect::Callback | Expect::ResponseAndCallback)
    }
}

/// A serial-API request to send through [`Session::call`].
#[derive(Debug, Clone)]
pub struct Request {
    pub function_id: u8,
    /// Payload without the callback id; the session appends it.
    pub payload: Bytes,
    pub expect: Expect,
    /// Use this callback id instead of allocating one.
    pub callback_id: Option<u8>,
    /// Complete on a response matching this predicate without waiting for
    /// the callback, e.g. when the controller refuses the request.
    pub finish_on_response: Option<fn(&Frame) -> bool>,
}

impl Request {
    /// A request that expects a Response frame.
    pub fn new(function_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            function_id,
            payload: payload.into(),
            expect: Expect::Response,
            callback_id: None,
            finish_on_response: None,
        }
    }

    pub fn expect(mut self, expect: Expect) -> Self {
        self.expect = expect;
        self
    }

    pub fn with_callback_id(mut self, callback_id: u8) -> Self {
        self.callback_id = Some(callback_id);
        self
    }

    pub fn finish_on_response(mut self, predicate: fn(&Frame) -> bool) -> Self {
        self.finish_on_response = Some(predicate);
        self
    }
}

/// Frames that completed a call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOutcome {
    pub response: Option<Frame>,
    pub callback: Option<Frame>,
}

/// Broadcast hub for frames no call claimed.
pub(crate) struct EventHub {
    sender: Mutex<Option<broadcast::Sender<Frame>>>,
}

impl EventHub {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    fn publish(&self, frame: Frame) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => {
                if sender.send(frame).is_err() {
                    trace!("no subscribers, event dropped");
                }
            }
            None => trace!("event hub closed, event dropped"),
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<Frame>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(broadcast::Sender::subscribe)
    }

    /// Drop the only sender so every open stream ends.
    fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Correlates calls with the frames that answer them and fans everything
/// else out to subscribers.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct Session {
    link: Link,
    pending: Arc<PendingTable>,
    events: Arc<EventHub>,
    /// One permit: a Response carries no id, so at most one request
    /// awaiting a Response may be on the wire.
    response_gate: Arc<Semaphore>,
    config: SessionConfig,
}

impl Session {
    /// Start a link over `stream` and the dispatcher that routes its frames.
    pub fn spawn<S: ByteStream>(stream: S, config: SessionConfig) -> Self {
        let (link, inbound) = Link::spawn(stream, config.link.clone());
        Self::new(link, inbound, config)
    }

    /// Wrap an existing link. `inbound` must be the receiver returned with it.
    pub fn new(link: Link, inbound: mpsc::Receiver<Frame>, config: SessionConfig) -> Self {
        let pending = Arc::new(PendingTable::default());
        let events = Arc::new(EventHub::new(config.event_capacity));
        tokio::spawn(dispatch(inbound, pending.clone(), events.clone()));
        debug!("session started");
        Self {
            link,
            pending,
            events,
            response_gate: Arc::new(Semaphore::new(1)),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn state(&self) -> LinkState {
        self.link.state()
    }

    /// Send a request and wait for the frames it expects.
    ///
    /// A callback id, when needed, is appended as the last payload byte.
    /// Requests expecting a Response take turns: the next one is transmitted
    /// only after the previous Response arrived or its call ended.
    /// Dropping the returned future abandons the call.
    /// The deadline covers transmission and reply; on expiry the call fails
    /// with [`TimeoutKind::ResponseTimeout`]. A late reply goes to
    /// subscribers, or to the next call awaiting the same Response.
    pub async fn call(&self, request: Request, timeout: Duration) -> Result<CallOutcome> {
        let Request {
            function_id,
            payload,
            expect,
            callback_id,
            finish_on_response,
        } = request;
        let function = function_name(function_id);

        if expect == Expect::Nothing {
            let frame = Frame::request(function_id, payload);
            return match tokio::time::timeout(timeout, self.link.send(frame)).await {
                Ok(sent) => sent.map(|()| CallOutcome::default()),
                Err(_) => Err(SessionError::ProtocolTimeout(TimeoutKind::ResponseTimeout)),
            };
        }

        let exchange = async {
            let turn = if expect.wants_response() {
                let permit = self
                    .response_gate
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| SessionError::TransportClosed)?;
                Some(permit)
            } else {
                None
            };
            let registration = self.pending.register(
                function_id,
                expect,
                callback_id,
                finish_on_response,
                turn,
            )?;
            let _guard = PendingGuard::new(self.pending.clone(), registration.seq);

            let payload = match registration.callback_id {
                Some(id) => {
                    let mut buf = BytesMut::with_capacity(payload.len() + 1);
                    buf.put_slice(&payload);
                    buf.put_u8(id);
                    buf.freeze()
                }
                None => payload,
            };
            trace!(function, callback_id = ?registration.callback_id, "call issued");

            self.link.send(Frame::request(function_id, payload)).await?;
            registration
                .outcome
                .await
                .map_err(|_| SessionError::TransportClosed)?
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!(function, ?timeout, "call timed out");
                Err(SessionError::ProtocolTimeout(TimeoutKind::ResponseTimeout))
            }
        }
    }

    /// [`Session::call`] with the configured default timeout.
    pub async fn call_default(&self, request: Request) -> Result<CallOutcome> {
        self.call(request, self.config.default_timeout).await
    }

    /// Stream of unclaimed frames accepted by `predicate`.
    ///
    /// Every call returns a fresh, independent stream. Streams end when the
    /// session closes.
    pub fn subscribe<F>(&self, predicate: F) -> EventStream
    where
        F: Fn(&Frame) -> bool + Send + Sync + 'static,
    {
        EventStream::new(self.events.subscribe(), Arc::new(predicate))
    }

    /// Stream of every unclaimed frame.
    pub fn subscribe_all(&self) -> EventStream {
        self.subscribe(|_| true)
    }

    /// Close the link, fail every pending call and end every stream.
    pub fn close(&self) {
        self.link.close();
        let failed = self.pending.close();
        self.events.close();
        debug!(failed, "session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.link.is_closed()
    }

    /// Number of calls still waiting for frames.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.link.state())
            .field("pending_calls", &self.pending.len())
            .finish()
    }
}

async fn dispatch(
    mut inbound: mpsc::Receiver<Frame>,
    pending: Arc<PendingTable>,
    events: Arc<EventHub>,
) {
    while let Some(frame) = inbound.recv().await {
        let claimed = if frame.is_response() {
            pending.resolve_response(&frame)
        } else if is_unsolicited(frame.function_id) {
            false
        } else {
            pending.resolve_callback(&frame)
        };
        if claimed {
            trace!(function = function_name(frame.function_id), "frame matched a call");
        } else {
            events.publish(frame);
        }
    }

    let failed = pending.close();
    events.close();
    debug!(failed, "link gone, session dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;
    use tokio_stream::StreamExt;
    use zwprims_frame::function::{APPLICATION_COMMAND_HANDLER, GET_VERSION, SEND_DATA};

    use super::*;
    use crate::testing::{device_pair, Device};

    fn spawn_session() -> (Session, Device) {
        let (host, device) = device_pair();
        (Session::spawn(host, SessionConfig::default()), device)
    }

    #[tokio::test(start_paused = true)]
    async fn call_resolves_with_response() {
        let (session, mut device) = spawn_session();
        let caller = session.clone();
        let call = tokio::spawn(async move {
            caller
                .call(Request::new(GET_VERSION, Vec::new()), Duration::from_secs(1))
                .await
        });

        let request = device.accept_frame().await;
        assert_eq!(request.function_id, GET_VERSION);
        assert!(request.payload.is_empty());
        device
            .deliver(&Frame::response(GET_VERSION, b"Z-Wave 4.05\0\x01".to_vec()))
            .await;

        let outcome = call.await.unwrap().unwrap();
        assert_eq!(outcome.response.unwrap().payload[0], b'Z');
        assert!(outcome.callback.is_none());
        assert_eq!(session.pending_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_id_appended_and_matched() {
        let (session, mut device) = spawn_session();
        let caller = session.clone();
        let call = tokio::spawn(async move {
            caller
                .call(
                    Request::new(SEND_DATA, vec![0x05, 0x01, 0x00])
                        .expect(Expect::ResponseAndCallback),
                    Duration::from_secs(5),
                )
                .await
        });

        let request = device.accept_frame().await;
        let callback_id = *request.payload.last().unwrap();
        assert_eq!(&request.payload[..3], &[0x05, 0x01, 0x00]);
        assert_ne!(callback_id, 0);

        device.deliver(&Frame::response(SEND_DATA, vec![0x01])).await;
        device
            .deliver(&Frame::request(SEND_DATA, vec![callback_id, 0x00]))
            .await;

        let outcome = call.await.unwrap().unwrap();
        assert_eq!(outcome.response.unwrap().payload.as_ref(), &[0x01]);
        assert_eq!(outcome.callback.unwrap().payload.as_ref(), &[callback_id, 0x00]);
    }

    #[tokio::test(start_paused = true)]
    async fn call_timeout_fires_on_time() {
        let (session, mut device) = spawn_session();
        let caller = session.clone();
        let started = Instant::now();
        let call = tokio::spawn(async move {
            caller
                .call(Request::new(GET_VERSION, Vec::new()), Duration::from_secs(2))
                .await
        });

        device.accept_frame().await;
        let err = call.await.unwrap().unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(
            err,
            SessionError::ProtocolTimeout(TimeoutKind::ResponseTimeout)
        ));
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(2200), "{elapsed:?}");
        assert_eq!(session.pending_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_goes_to_subscribers() {
        let (session, mut device) = spawn_session();
        let mut events = session.subscribe_all();
        let caller = session.clone();
        let call = tokio::spawn(async move {
            caller
                .call(Request::new(GET_VERSION, Vec::new()), Duration::from_secs(1))
                .await
        });
        device.accept_frame().await;
        assert!(call.await.unwrap().is_err());

        let late = Frame::response(GET_VERSION, vec![0x01]);
        device.deliver(&late).await;
        assert_eq!(events.next().await.unwrap(), late);
    }

    #[tokio::test(start_paused = true)]
    async fn unsolicited_frames_reach_every_matching_subscriber() {
        let (session, mut device) = spawn_session();
        let mut all = session.subscribe_all();
        let mut handler =
            session.subscribe(|frame| frame.function_id == APPLICATION_COMMAND_HANDLER);
        let mut updates = session.subscribe(|frame| frame.function_id == 0x49);

        let event = Frame::request(
            APPLICATION_COMMAND_HANDLER,
            vec![0x00, 0x05, 0x03, 0x25, 0x03, 0xFF],
        );
        let update = Frame::request(0x49, vec![0x84, 0x05, 0x00]);
        device.deliver(&event).await;
        device.deliver(&update).await;

        assert_eq!(all.next().await.unwrap(), event);
        assert_eq!(all.next().await.unwrap(), update);
        assert_eq!(handler.next().await.unwrap(), event);
        assert_eq!(updates.next().await.unwrap(), update);
    }

    #[tokio::test(start_paused = true)]
    async fn unsolicited_frame_never_taken_as_callback() {
        let (session, mut device) = spawn_session();
        let mut events = session.subscribe_all();
        let caller = session.clone();
        let call = tokio::spawn(async move {
            caller
                .call(
                    Request::new(APPLICATION_COMMAND_HANDLER, Vec::new())
                        .expect(Expect::Callback)
                        .with_callback_id(0x01),
                    Duration::from_secs(1),
                )
                .await
        });
        device.accept_frame().await;

        let event = Frame::request(APPLICATION_COMMAND_HANDLER, vec![0x01, 0x05]);
        device.deliver(&event).await;
        assert_eq!(events.next().await.unwrap(), event);
        assert!(call.await.unwrap().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_callback_id_rejected_while_outstanding() {
        let (session, mut device) = spawn_session();
        let request = Request::new(SEND_DATA, vec![0x05])
            .expect(Expect::Callback)
            .with_callback_id(9);
        let caller = session.clone();
        let first = request.clone();
        let call = tokio::spawn(async move { caller.call(first, Duration::from_secs(5)).await });
        device.accept_frame().await;

        let err = session
            .call(request, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::DuplicateCallbackId(9)));

        device.deliver(&Frame::request(SEND_DATA, vec![9, 0x00])).await;
        call.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn close_fails_pending_calls_and_ends_streams() {
        let (session, mut device) = spawn_session();
        let mut events = session.subscribe_all();

        let first_caller = session.clone();
        let first = tokio::spawn(async move {
            first_caller
                .call(Request::new(GET_VERSION, Vec::new()), Duration::from_secs(30))
                .await
        });
        device.accept_frame().await;
        let second_caller = session.clone();
        let second = tokio::spawn(async move {
            second_caller
                .call(
                    Request::new(SEND_DATA, vec![0x05]).expect(Expect::Callback),
                    Duration::from_secs(30),
                )
                .await
        });
        device.accept_frame().await;

        session.close();

        assert!(matches!(
            first.await.unwrap(),
            Err(SessionError::TransportClosed)
        ));
        assert!(matches!(
            second.await.unwrap(),
            Err(SessionError::TransportClosed)
        ));
        assert!(events.next().await.is_none());
        assert!(matches!(
            session
                .call(Request::new(GET_VERSION, Vec::new()), Duration::from_secs(1))
                .await,
            Err(SessionError::TransportClosed)
        ));
        assert!(session.subscribe_all().next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn peer_disconnect_fails_pending_calls() {
        let (session, mut device) = spawn_session();
        let caller = session.clone();
        let call = tokio::spawn(async move {
            caller
                .call(Request::new(GET_VERSION, Vec::new()), Duration::from_secs(30))
                .await
        });
        device.accept_frame().await;
        drop(device);

        assert!(matches!(
            call.await.unwrap(),
            Err(SessionError::TransportClosed)
        ));
        session.link().closed().await;
        assert_eq!(session.state(), LinkState::Closed);
    }

    fn answer_for(request: &Frame) -> Frame {
        let mut answer = b"answer-for-".to_vec();
        answer.extend_from_slice(&request.payload);
        Frame::response(request.function_id, answer)
    }

    #[tokio::test(start_paused = true)]
    async fn same_function_calls_take_turns() {
        let (session, mut device) = spawn_session();
        let first_caller = session.clone();
        let first = tokio::spawn(async move {
            first_caller
                .call(Request::new(GET_VERSION, vec![0xAA]), Duration::from_secs(5))
                .await
        });
        let second_caller = session.clone();
        let second = tokio::spawn(async move {
            second_caller
                .call(Request::new(GET_VERSION, vec![0xBB]), Duration::from_secs(5))
                .await
        });

        let request = device.accept_frame().await;
        assert!(
            tokio::time::timeout(Duration::from_millis(500), device.next())
                .await
                .is_err(),
            "second request sent before the first was answered"
        );
        device.deliver(&answer_for(&request)).await;

        let next = device.accept_frame().await;
        assert_ne!(next.payload, request.payload);
        device.deliver(&answer_for(&next)).await;

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.response.unwrap().payload.as_ref(), b"answer-for-\xAA");
        let second = second.await.unwrap().unwrap();
        assert_eq!(second.response.unwrap().payload.as_ref(), b"answer-for-\xBB");
    }

    #[tokio::test(start_paused = true)]
    async fn callback_only_calls_do_not_wait_for_a_turn() {
        let (session, mut device) = spawn_session();
        let caller = session.clone();
        let _version = tokio::spawn(async move {
            caller
                .call(Request::new(GET_VERSION, Vec::new()), Duration::from_secs(5))
                .await
        });
        assert_eq!(device.accept_frame().await.function_id, GET_VERSION);

        let caller = session.clone();
        let send = tokio::spawn(async move {
            caller
                .call(
                    Request::new(SEND_DATA, vec![0x05]).expect(Expect::Callback),
                    Duration::from_secs(5),
                )
                .await
        });
        let request = device.accept_frame().await;
        assert_eq!(request.function_id, SEND_DATA);
        let callback_id = *request.payload.last().unwrap();
        device
            .deliver(&Frame::request(SEND_DATA, vec![callback_id, 0x00]))
            .await;
        send.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_call_leaves_nothing_behind() {
        let (session, mut device) = spawn_session();
        let caller = session.clone();
        let call = tokio::spawn(async move {
            caller
                .call(
                    Request::new(SEND_DATA, vec![0x05])
                        .expect(Expect::ResponseAndCallback)
                        .with_callback_id(7),
                    Duration::from_secs(30),
                )
                .await
        });
        device.accept_frame().await;
        assert_eq!(session.pending_calls(), 1);

        call.abort();
        assert!(call.await.unwrap_err().is_cancelled());
        assert_eq!(session.pending_calls(), 0);

        // the callback id and the response turn are both free again
        let caller = session.clone();
        let retry = tokio::spawn(async move {
            caller
                .call(
                    Request::new(SEND_DATA, vec![0x05])
                        .expect(Expect::ResponseAndCallback)
                        .with_callback_id(7),
                    Duration::from_secs(30),
                )
                .await
        });
        device.accept_frame().await;
        device.deliver(&Frame::response(SEND_DATA, vec![0x01])).await;
        device.deliver(&Frame::request(SEND_DATA, vec![7, 0x00])).await;
        retry.await.unwrap().unwrap();
        assert_eq!(session.pending_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fire_and_forget_resolves_on_ack() {
        let (session, mut device) = spawn_session();
        let caller = session.clone();
        let call = tokio::spawn(async move {
            caller
                .call(
                    Request::new(0x08, Vec::new()).expect(Expect::Nothing),
                    Duration::from_secs(1),
                )
                .await
        });
        device.accept_frame().await;
        assert_eq!(call.await.unwrap().unwrap(), CallOutcome::default());
    }
}
