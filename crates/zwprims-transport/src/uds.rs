use std::path::Path;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::SerialStream;

/// Unix socket bridge transport.
///
/// Connects to a controller whose serial line is relayed onto a Unix domain
/// socket (for example `socat UNIX-LISTEN:... /dev/ttyACM0`). The bridge is
/// expected to pass bytes through untouched.
pub struct UnixBridge;

impl UnixBridge {
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Connect to a listening bridge socket.
    pub async fn connect(path: impl AsRef<Path>) -> Result<SerialStream> {
        let path = path.as_ref();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path: path.to_path_buf(),
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        let stream = tokio::net::UnixStream::connect(path)
            .await
            .map_err(|e| TransportError::Connect {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, "connected to serial bridge socket");
        Ok(SerialStream::from_bridge(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_connect_and_exchange_bytes() {
        let dir = std::env::temp_dir().join(format!("zwprims-bridge-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("bridge.sock");
        let _ = std::fs::remove_file(&sock_path);

        let listener = tokio::net::UnixListener::bind(&sock_path).unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _addr) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, [0x01, 0x03, 0x00, 0x15, 0xE9]);
            stream.write_all(&[0x06]).await.unwrap();
        });

        let mut client = UnixBridge::connect(&sock_path).await.unwrap();
        assert_eq!(client.transport_name(), "unix-socket-bridge");
        client.write_all(&[0x01, 0x03, 0x00, 0x15, 0xE9]).await.unwrap();
        let mut ack = [0u8; 1];
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack, [0x06]);

        server.await.unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = UnixBridge::connect(&long_path).await;
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[tokio::test]
    async fn test_connect_missing_socket() {
        let path = std::env::temp_dir().join(format!(
            "zwprims-missing-{}.sock",
            std::process::id()
        ));
        let result = UnixBridge::connect(&path).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
