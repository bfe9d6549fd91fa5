use std::time::Duration;

/// Tunables shared by all transports opened through one factory.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Upper bound for a TCP client connect. Default: 5 s.
    pub connect_timeout: Duration,
    /// How long a blocked serial read waits before rechecking for close.
    /// Rounded to tenths of a second, clamped to 0.1..=25.5 s. Default: 100 ms.
    pub serial_poll_interval: Duration,
    /// Read buffer size for blocking readers. Default: 4 KiB.
    pub read_chunk_size: usize,
    /// How long `close()` waits for a socket to flush queued frames and
    /// shut down. Default: 1 s.
    pub close_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            serial_poll_interval: Duration::from_millis(100),
            read_chunk_size: 4 * 1024,
            close_timeout: Duration::from_secs(1),
        }
    }
}
