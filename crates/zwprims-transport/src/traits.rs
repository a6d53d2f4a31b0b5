use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Any duplex byte stream that can carry the serial API.
///
/// Implemented for every `AsyncRead + AsyncWrite` type, so tests can hand the
/// link an in-memory `tokio::io::duplex` pipe while production code hands it
/// a [`SerialStream`].
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// A connected controller stream implementing `AsyncRead + AsyncWrite`.
///
/// This is the fundamental I/O type returned by transport operations.
/// On Unix, this wraps either a tty device node or a socket bridge.
pub struct SerialStream {
    inner: SerialStreamInner,
}

enum SerialStreamInner {
    #[cfg(unix)]
    Device(crate::serial::TtyDevice),
    #[cfg(unix)]
    Bridge(tokio::net::UnixStream),
}

impl SerialStream {
    #[cfg(unix)]
    pub(crate) fn from_device(device: crate::serial::TtyDevice) -> Self {
        Self {
            inner: SerialStreamInner::Device(device),
        }
    }

    #[cfg(unix)]
    pub(crate) fn from_bridge(stream: tokio::net::UnixStream) -> Self {
        Self {
            inner: SerialStreamInner::Bridge(stream),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Device(_) => "serial-device",
            #[cfg(unix)]
            SerialStreamInner::Bridge(_) => "unix-socket-bridge",
        }
    }
}

impl AsyncRead for SerialStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            SerialStreamInner::Device(file) => Pin::new(file).poll_read(cx, buf),
            #[cfg(unix)]
            SerialStreamInner::Bridge(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SerialStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            SerialStreamInner::Device(file) => Pin::new(file).poll_write(cx, buf),
            #[cfg(unix)]
            SerialStreamInner::Bridge(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            SerialStreamInner::Device(file) => Pin::new(file).poll_flush(cx),
            #[cfg(unix)]
            SerialStreamInner::Bridge(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            #[cfg(unix)]
            SerialStreamInner::Device(file) => Pin::new(file).poll_shutdown(cx),
            #[cfg(unix)]
            SerialStreamInner::Bridge(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("type", &self.transport_name())
            .finish()
    }
}
