use std::net::SocketAddr;

use bytes::Bytes;

use crate::error::TransportError;

/// The capability every transport provides to a [`crate::Connection`].
///
/// A transport is constructed already open (each type's `open` acquires the
/// OS resource and starts its reader), receives through the [`crate::Link`] it
/// was opened with, and is owned by exactly one connection. The connection
/// guarantees `close` is called at most once.
pub trait Transport: Send + 'static {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Hand a complete frame to the transport.
    ///
    /// Non-blocking transports queue the frame and return immediately; write
    /// failures surface later as [`crate::LinkEvent::Failed`].
    fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Release the OS resource and stop any reader.
    fn close(&mut self);

    /// Local socket address, for socket transports.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}
