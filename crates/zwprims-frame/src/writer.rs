use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::codec::{ControlToken, Frame, FrameConfig, FrameKind, Outbound, SerialCodec};
use crate::error::{FrameError, Result};

/// Writes frames and control tokens to any `AsyncWrite` stream.
///
/// Every call encodes, writes and flushes one item before returning.
pub struct FrameWriter<T> {
    inner: FramedWrite<T, SerialCodec>,
    config: FrameConfig,
}

impl<T: AsyncWrite + Unpin> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner: FramedWrite::new(inner, SerialCodec::with_config(&config)),
            config,
        }
    }

    /// Write a complete frame.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write(Outbound::Frame(frame.clone())).await
    }

    /// Encode and send a payload for a function.
    pub async fn send(&mut self, kind: FrameKind, function_id: u8, payload: &[u8]) -> Result<()> {
        let frame = Frame::new(kind, function_id, bytes::Bytes::copy_from_slice(payload));
        self.write(Outbound::Frame(frame)).await
    }

    /// Write a single handshake byte.
    pub async fn send_control(&mut self, token: ControlToken) -> Result<()> {
        self.write(Outbound::Control(token)).await
    }

    async fn write(&mut self, item: Outbound) -> Result<()> {
        match self.config.write_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.send(item))
                .await
                .map_err(|_| {
                    FrameError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "serial write timed out",
                    ))
                })?,
            None => self.inner.send(item).await,
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
