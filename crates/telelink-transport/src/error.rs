use std::io;
use std::net::SocketAddr;

/// Errors raised by a transport while acquiring or using its OS resource.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open a device.
    #[error("{transport}: failed to open {target}: {source}")]
    Open {
        transport: &'static str,
        target: String,
        source: io::Error,
    },

    /// Failed to resolve a host name.
    #[error("{transport}: failed to resolve {target}: {source}")]
    Resolve {
        transport: &'static str,
        target: String,
        source: io::Error,
    },

    /// Failed to bind to the specified address.
    #[error("{transport}: failed to bind to {addr}: {source}")]
    Bind {
        transport: &'static str,
        addr: SocketAddr,
        source: io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("{transport}: failed to connect to {target}: {source}")]
    Connect {
        transport: &'static str,
        target: String,
        source: io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("{transport}: failed to accept connection: {source}")]
    Accept {
        transport: &'static str,
        source: io::Error,
    },

    /// An I/O error occurred on an open transport.
    #[error("{transport}: I/O error: {source}")]
    Io {
        transport: &'static str,
        source: io::Error,
    },

    /// The remote end closed the stream.
    #[error("{transport}: connection closed by remote end")]
    Disconnected { transport: &'static str },

    /// The connection has been closed locally.
    #[error("connection closed")]
    Closed,

    /// The shared reactor is no longer running.
    #[error("reactor shut down")]
    Shutdown,
}

impl TransportError {
    /// Name of the transport that raised the error, if any.
    pub fn transport(&self) -> Option<&'static str> {
        match self {
            TransportError::Open { transport, .. }
            | TransportError::Resolve { transport, .. }
            | TransportError::Bind { transport, .. }
            | TransportError::Connect { transport, .. }
            | TransportError::Accept { transport, .. }
            | TransportError::Io { transport, .. }
            | TransportError::Disconnected { transport } => Some(*transport),
            TransportError::Closed | TransportError::Shutdown => None,
        }
    }

    /// Underlying OS error, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            TransportError::Open { source, .. }
            | TransportError::Resolve { source, .. }
            | TransportError::Bind { source, .. }
            | TransportError::Connect { source, .. }
            | TransportError::Accept { source, .. }
            | TransportError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Why an endpoint descriptor was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("unknown scheme '{0}'")]
    UnknownScheme(String),

    #[error("udp descriptor needs exactly one '@' between bind and remote address")]
    MissingSeparator,

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("invalid baud rate '{0}'")]
    InvalidBaud(String),

    #[error("malformed host '{0}'")]
    InvalidHost(String),

    #[error("malformed query parameter '{0}' (expected key=value)")]
    MalformedQuery(String),

    #[error("invalid ids '{0}' (expected <system>,<component>)")]
    InvalidIds(String),
}

/// Errors returned when opening or driving a connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unsupported descriptor text.
    #[error("invalid descriptor '{text}': {reason}")]
    InvalidDescriptor {
        text: String,
        #[source]
        reason: DescriptorError,
    },

    /// Every channel id is in use.
    #[error("no free channel ({max} in use)")]
    ResourceExhausted { max: usize },

    /// OS-level open/bind/connect/I-O failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be framed for sending.
    #[error(transparent)]
    Frame(#[from] telelink_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, Error>;
