use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::SerialStream;

/// Line speed of every shipping serial-API controller.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Line settings applied when opening a device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    /// Line speed in baud. Default: 115200.
    pub baud_rate: u32,
    /// Discard bytes the driver buffered before we opened the port.
    pub flush_on_open: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            flush_on_open: true,
        }
    }
}

/// tty device transport.
///
/// Opens a USB/UART controller device node non-blocking, puts it into raw
/// 8N1 mode at the configured speed and registers it with the tokio reactor.
pub struct SerialPort;

impl SerialPort {
    /// Open a device node with default line settings.
    pub fn open(path: impl AsRef<Path>) -> Result<SerialStream> {
        Self::open_with_config(path, &SerialConfig::default())
    }

    /// Open a device node with explicit line settings.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open_with_config(path: impl AsRef<Path>, config: &SerialConfig) -> Result<SerialStream> {
        let path = path.as_ref().to_path_buf();
        let speed = baud_to_speed(config.baud_rate)?;

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        configure_raw(file.as_raw_fd(), speed, config.flush_on_open).map_err(|source| {
            TransportError::Configure {
                path: path.clone(),
                source,
            }
        })?;

        let device = TtyDevice::new(file).map_err(|source| TransportError::Open {
            path: path.clone(),
            source,
        })?;
        info!(?path, baud = config.baud_rate, "opened serial device");
        Ok(SerialStream::from_device(device))
    }
}

/// Non-blocking tty descriptor driven by reactor readiness, so a pending
/// read never holds up a write.
pub(crate) struct TtyDevice {
    fd: AsyncFd<File>,
}

impl TtyDevice {
    fn new(file: File) -> io::Result<Self> {
        Ok(Self {
            fd: AsyncFd::new(file)?,
        })
    }
}

impl AsyncRead for TtyDevice {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|fd| (&mut &*fd.get_ref()).read(unfilled)) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for TtyDevice {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.fd.poll_write_ready(cx))?;
            match guard.try_io(|fd| (&mut &*fd.get_ref()).write(buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn baud_to_speed(baud: u32) -> Result<libc::speed_t> {
    let speed = match baud {
        9_600 => libc::B9600,
        19_200 => libc::B19200,
        38_400 => libc::B38400,
        57_600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        other => return Err(TransportError::UnsupportedBaudRate(other)),
    };
    Ok(speed)
}

fn configure_raw(fd: RawFd, speed: libc::speed_t, flush: bool) -> io::Result<()> {
    // SAFETY: `fd` is an open descriptor owned by the caller; isatty only inspects it.
    if unsafe { libc::isatty(fd) } != 1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a terminal device",
        ));
    }

    let mut tty = std::mem::MaybeUninit::<libc::termios>::uninit();
    // SAFETY: `tty` is a valid writable pointer to a termios-sized buffer.
    if unsafe { libc::tcgetattr(fd, tty.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: tcgetattr succeeded, so every field has been written.
    let mut tty = unsafe { tty.assume_init() };

    // SAFETY: `tty` is an initialised termios owned by this frame.
    unsafe { libc::cfmakeraw(&mut tty) };
    tty.c_cflag |= libc::CLOCAL | libc::CREAD;
    tty.c_cflag &= !(libc::CSTOPB | libc::PARENB);
    tty.c_cc[libc::VMIN] = 1;
    tty.c_cc[libc::VTIME] = 0;

    // SAFETY: `tty` is valid for both calls; the speed constant comes from libc.
    let rc = unsafe {
        let rc = libc::cfsetispeed(&mut tty, speed);
        if rc == 0 {
            libc::cfsetospeed(&mut tty, speed)
        } else {
            rc
        }
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `fd` is open and `tty` points to a fully initialised termios.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tty) } != 0 {
        return Err(io::Error::last_os_error());
    }

    if flush {
        debug!(fd, "flushing stale serial buffers");
        // SAFETY: `fd` is an open terminal descriptor.
        if unsafe { libc::tcflush(fd, libc::TCIOFLUSH) } != 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}
