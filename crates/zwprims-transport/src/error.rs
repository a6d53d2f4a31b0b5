use std::path::PathBuf;

/// Errors that can occur in byte transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device node.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The device opened but could not be put into raw serial mode.
    #[error("failed to configure {path}: {source}")]
    Configure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to a socket bridge.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested line speed has no termios equivalent.
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
