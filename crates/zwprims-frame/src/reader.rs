use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::{FrameConfig, Inbound, SerialCodec};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Reads classified items from any `AsyncRead` stream.
///
/// Handles partial reads and line noise internally; callers always get a
/// complete frame, a control token, or a rejected frame to NAK.
pub struct FrameReader<T> {
    inner: FramedRead<T, SerialCodec>,
}

impl<T: AsyncRead + Unpin> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner: FramedRead::with_capacity(
                inner,
                SerialCodec::with_config(&config),
                INITIAL_BUFFER_CAPACITY,
            ),
        }
    }

    /// Read the next item.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub async fn read_next(&mut self) -> Result<Inbound> {
        match self.inner.next().await {
            Some(item) => item,
            None => Err(FrameError::ConnectionClosed),
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        self.inner.get_ref()
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}
