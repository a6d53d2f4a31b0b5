//! Open a transport and start a session on it in one step.

use std::path::Path;

use tracing::debug;
use zwprims_transport::{SerialConfig, SerialPort, UnixBridge};

use crate::error::Result;
use crate::session::{Session, SessionConfig};

/// Open a controller attached as a tty device.
///
/// Must be called from within a tokio runtime.
pub fn open_serial(
    path: impl AsRef<Path>,
    serial: &SerialConfig,
    config: SessionConfig,
) -> Result<Session> {
    let path = path.as_ref();
    let stream = SerialPort::open_with_config(path, serial)?;
    debug!(?path, "starting session on serial device");
    Ok(Session::spawn(stream, config))
}

/// Connect to a controller relayed onto a Unix socket.
pub async fn connect_bridge(path: impl AsRef<Path>, config: SessionConfig) -> Result<Session> {
    let path = path.as_ref();
    let stream = UnixBridge::connect(path).await?;
    debug!(?path, transport = stream.transport_name(), "starting session on bridge");
    Ok(Session::spawn(stream, config))
}
