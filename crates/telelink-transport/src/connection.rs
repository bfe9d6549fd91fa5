//! The live, bidirectional handle returned by the factory.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};
use telelink_frame::{encode_message, FrameEncoder, Message};

use crate::channel::ChannelId;
use crate::error::{Result, TransportError};
use crate::link::{lock, Link, LinkEvent, LinkStats};
use crate::url::Identity;

/// An open endpoint holding one channel id until it is closed or dropped.
///
/// All methods take `&self`; a connection can be shared between threads
/// behind an `Arc`.
pub struct Connection {
    link: Link,
    encoder: Mutex<FrameEncoder>,
    identity: Identity,
    transport: &'static str,
    local_addr: Option<SocketAddr>,
}

impl Connection {
    pub(crate) fn new(
        link: Link,
        identity: Identity,
        transport: &'static str,
        local_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            link,
            encoder: Mutex::new(FrameEncoder::new(
                identity.system_id,
                identity.component_id,
            )),
            identity,
            transport,
            local_addr,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.link.channel()
    }

    pub fn system_id(&self) -> u8 {
        self.identity.system_id
    }

    pub fn component_id(&self) -> u8 {
        self.identity.component_id
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Short transport name: `serial`, `udp`, `tcp` or `tcp-listen`.
    pub fn transport_name(&self) -> &'static str {
        self.transport
    }

    /// Bound local address of a socket transport.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_open(&self) -> bool {
        !self.link.is_closed()
    }

    /// Send already-framed bytes.
    pub fn send_bytes(&self, bytes: impl Into<Bytes>) -> Result<()> {
        self.link.send(bytes.into())?;
        Ok(())
    }

    /// Frame `payload` with this connection's identity and next sequence
    /// number, then send it.
    pub fn send_message(&self, msg_id: u8, payload: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::Closed.into());
        }
        let frame = lock(&self.encoder).finalize(msg_id, payload)?;
        self.send_bytes(frame)
    }

    /// Send `message` exactly as given, keeping its origin and sequence.
    pub fn send(&self, message: &Message) -> Result<()> {
        let mut buf = BytesMut::with_capacity(message.wire_size());
        encode_message(message, &mut buf)?;
        self.send_bytes(buf.freeze())
    }

    /// Register a handler for decoded inbound messages.
    ///
    /// Handlers run on the thread that reads the transport (the reactor or a
    /// serial reader thread) and must not block for long. Reading starts when
    /// the connection opens, so frames that arrive before this call are not
    /// replayed; pass [`crate::Handlers`] to
    /// [`ConnectionFactory::open_subscribed`](crate::ConnectionFactory::open_subscribed)
    /// to catch those.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&Message, ChannelId) + Send + Sync + 'static,
    {
        self.link.subscribe(Arc::new(handler));
    }

    /// Register a handler for lifecycle and error events.
    pub fn subscribe_events<F>(&self, handler: F)
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        self.link.subscribe_events(Arc::new(handler));
    }

    pub fn stats(&self) -> LinkStats {
        self.link.stats()
    }

    /// Stop I/O and release the channel id. Safe to call more than once.
    pub fn close(&self) {
        self.link.close();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.link.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("channel", &self.channel())
            .field("transport", &self.transport)
            .field("identity", &self.identity)
            .field("local_addr", &self.local_addr)
            .field("open", &self.is_open())
            .finish()
    }
}
