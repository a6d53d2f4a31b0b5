//! Filtered streams over the session's event broadcast.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;
use zwprims_frame::Frame;

pub(crate) type Predicate = Arc<dyn Fn(&Frame) -> bool + Send + Sync>;

/// Frames no call claimed, filtered by a predicate.
///
/// A subscriber that falls behind skips the frames it missed and logs how
/// many. The stream ends when the session closes.
pub struct EventStream {
    inner: Option<BroadcastStream<Frame>>,
    predicate: Predicate,
}

impl EventStream {
    pub(crate) fn new(receiver: Option<broadcast::Receiver<Frame>>, predicate: Predicate) -> Self {
        Self {
            inner: receiver.map(BroadcastStream::new),
            predicate,
        }
    }
}

impl Stream for EventStream {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        let this = &mut *self;
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        loop {
            match Pin::new(&mut *inner).poll_next(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    if (this.predicate)(&frame) {
                        return Poll::Ready(Some(frame));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(skipped, "event subscriber lagged, frames skipped");
                }
                Poll::Ready(None) => {
                    this.inner = None;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("open", &self.inner.is_some())
            .finish()
    }
}
