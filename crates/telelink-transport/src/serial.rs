//! Serial device transport.
//!
//! The device is put into raw 8N1 mode with a bounded read timeout
//! (`VMIN=0`, `VTIME=poll interval`), and a dedicated thread reads it. The
//! timeout lets [`Transport::close`] stop that thread in bounded time.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use telelink_frame::FrameDecoder;
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::error::TransportError;
use crate::link::Link;
use crate::traits::Transport;

const NAME: &str = "serial";

/// A serial device opened in raw mode.
pub struct SerialTransport {
    device: String,
    port: File,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Open and configure `path` at `baud`, then start the reader thread.
    pub fn open(
        link: &Link,
        path: &str,
        baud: u32,
        config: &LinkConfig,
    ) -> Result<Self, TransportError> {
        let open_err = |source: io::Error| TransportError::Open {
            transport: NAME,
            target: path.to_string(),
            source,
        };

        // O_NONBLOCK only for the open itself so it cannot hang on carrier detect.
        let port = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(open_err)?;
        let fd = port.as_raw_fd();
        configure_raw(fd, baud, config.serial_poll_interval).map_err(open_err)?;
        set_blocking(fd).map_err(open_err)?;

        let reader_port = port.try_clone().map_err(open_err)?;
        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let link = link.clone();
            let stop = Arc::clone(&stop);
            let chunk = config.read_chunk_size.max(1);
            thread::Builder::new()
                .name(format!("telelink-serial-{}", link.channel()))
                .spawn(move || read_loop(reader_port, link, stop, chunk))
                .map_err(open_err)?
        };

        info!(device = path, baud, channel = %link.channel(), "serial port open");
        Ok(Self {
            device: path.to_string(),
            port,
            stop,
            reader: Some(reader),
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> &'static str {
        NAME
    }

    fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.port
            .write_all(&frame)
            .map_err(|source| TransportError::Io {
                transport: NAME,
                source,
            })
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        let Some(reader) = self.reader.take() else {
            return;
        };
        if reader.thread().id() == thread::current().id() {
            // Closing from a handler on the reader thread; it exits on its own.
            return;
        }
        let _ = reader.join();
        debug!(device = %self.device, "serial reader stopped");
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(mut port: File, link: Link, stop: Arc<AtomicBool>, chunk: usize) {
    let channel = link.channel();
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; chunk];

    while !stop.load(Ordering::Acquire) {
        match port.read(&mut buf) {
            // VTIME expired with nothing to read.
            Ok(0) => continue,
            Ok(n) => {
                link.record_rx(n);
                decoder.push(&buf[..n]);
                link.ingest(channel, &mut decoder);
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => {
                continue
            }
            Err(source) => {
                if !stop.load(Ordering::Acquire) {
                    link.fail(TransportError::Io {
                        transport: NAME,
                        source,
                    });
                }
                break;
            }
        }
    }
}

fn configure_raw(fd: RawFd, baud: u32, poll: Duration) -> io::Result<()> {
    let speed = baud_speed(baud).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported baud rate {baud}"),
        )
    })?;
    let deciseconds = (poll.as_millis() / 100).clamp(1, 255) as libc::cc_t;

    // SAFETY: termios is plain old data; tcgetattr fully initialises it
    // before any field is read.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    check(unsafe { libc::tcgetattr(fd, &mut tio) })?;

    // SAFETY: `tio` is a valid, initialised termios for the calls below.
    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cflag &= !(libc::CSTOPB | libc::CRTSCTS);
    tio.c_cc[libc::VMIN] = 0;
    tio.c_cc[libc::VTIME] = deciseconds;

    check(unsafe { libc::cfsetispeed(&mut tio, speed) })?;
    check(unsafe { libc::cfsetospeed(&mut tio, speed) })?;
    check(unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) })?;
    check(unsafe { libc::tcflush(fd, libc::TCIOFLUSH) })?;
    Ok(())
}

fn set_blocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on an owned, open descriptor.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    check(flags)?;
    check(unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) })?;
    Ok(())
}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn baud_speed(baud: u32) -> Option<libc::speed_t> {
    Some(match baud {
        50 => libc::B50,
        75 => libc::B75,
        110 => libc::B110,
        134 => libc::B134,
        150 => libc::B150,
        200 => libc::B200,
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        1800 => libc::B1800,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        460800 => libc::B460800,
        500000 => libc::B500000,
        576000 => libc::B576000,
        921600 => libc::B921600,
        1000000 => libc::B1000000,
        1500000 => libc::B1500000,
        2000000 => libc::B2000000,
        3000000 => libc::B3000000,
        _ => return None,
    })
}

// BSD-derived systems take the numeric rate directly.
#[cfg(not(target_os = "linux"))]
fn baud_speed(baud: u32) -> Option<libc::speed_t> {
    Some(baud as libc::speed_t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn standard_rates_map_to_constants() {
        assert_eq!(baud_speed(57600), Some(libc::B57600));
        assert_eq!(baud_speed(115200), Some(libc::B115200));
        assert_eq!(baud_speed(12345), None);
    }

    #[test]
    fn configure_rejects_non_terminal() {
        let file = File::open("/dev/null").unwrap();
        let err = configure_raw(file.as_raw_fd(), 57600, Duration::from_millis(100)).unwrap_err();
        assert!(err.raw_os_error().is_some());
    }
}
