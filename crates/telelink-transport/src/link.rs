//! State shared between a [`crate::Connection`] and the reader side of its transport.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use bytes::Bytes;
use telelink_frame::{FrameDecoder, FrameError, Message};
use tracing::{debug, warn};

use crate::channel::{ChannelId, ChannelLease, ChannelRegistry};
use crate::error::TransportError;
use crate::traits::Transport;

/// Callback for decoded messages, tagged with the channel they arrived on.
pub type MessageHandler = Arc<dyn Fn(&Message, ChannelId) + Send + Sync>;

/// Callback for lifecycle and error events.
pub type EventHandler = Arc<dyn Fn(&LinkEvent) + Send + Sync>;

/// Handlers attached to a link before its transport starts reading.
///
/// Anything the peer sends straight after connect or accept reaches these;
/// handlers added later through [`crate::Connection::subscribe`] only see
/// what arrives after they are registered.
#[derive(Clone, Default)]
pub struct Handlers {
    messages: Vec<MessageHandler>,
    events: Vec<EventHandler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Message, ChannelId) + Send + Sync + 'static,
    {
        self.messages.push(Arc::new(handler));
        self
    }

    pub fn on_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        self.events.push(Arc::new(handler));
        self
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handlers")
            .field("messages", &self.messages.len())
            .field("events", &self.events.len())
            .finish()
    }
}

/// Something that happened on a link other than a decoded message.
#[derive(Debug)]
pub enum LinkEvent {
    /// The codec rejected bytes received on `channel`. The stream continues.
    Decode {
        channel: ChannelId,
        error: FrameError,
    },
    /// The transport failed; the connection closes right after this event.
    Failed(TransportError),
    /// A listener accepted a peer, which now owns `channel`.
    PeerConnected { channel: ChannelId, addr: SocketAddr },
    /// An accepted peer went away and its channel was released.
    PeerDisconnected { channel: ChannelId, addr: SocketAddr },
    /// The connection closed and its channel was released.
    Closed,
}

/// Point-in-time I/O counters for a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub tx_bytes: u64,
    /// Frames accepted for sending, including any later dropped.
    pub tx_frames: u64,
    /// Frames accepted for sending but discarded for lack of a destination.
    pub tx_dropped: u64,
    pub rx_bytes: u64,
    pub rx_messages: u64,
    pub rx_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    tx_bytes: AtomicU64,
    tx_frames: AtomicU64,
    tx_dropped: AtomicU64,
    rx_bytes: AtomicU64,
    rx_messages: AtomicU64,
    rx_errors: AtomicU64,
}

struct Shared {
    channel: ChannelId,
    registry: Arc<ChannelRegistry>,
    lease: Mutex<Option<ChannelLease>>,
    transport: Mutex<Option<Box<dyn Transport>>>,
    closed: AtomicBool,
    message_handlers: RwLock<Vec<MessageHandler>>,
    event_handlers: RwLock<Vec<EventHandler>>,
    counters: Counters,
}

/// Handle a transport uses to push received data and report failures.
///
/// Cheap to clone; every clone refers to the same link.
#[derive(Clone)]
pub struct Link {
    shared: Arc<Shared>,
}

impl Link {
    pub(crate) fn new(lease: ChannelLease, registry: Arc<ChannelRegistry>) -> Self {
        Self {
            shared: Arc::new(Shared {
                channel: lease.id(),
                registry,
                lease: Mutex::new(Some(lease)),
                transport: Mutex::new(None),
                closed: AtomicBool::new(false),
                message_handlers: RwLock::new(Vec::new()),
                event_handlers: RwLock::new(Vec::new()),
                counters: Counters::default(),
            }),
        }
    }

    /// The channel this link owns.
    pub fn channel(&self) -> ChannelId {
        self.shared.channel
    }

    /// Registry the link's channel came from; listeners lease per-peer ids here.
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.shared.registry
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Decode everything buffered in `decoder` and dispatch it.
    ///
    /// Messages go to subscribers in arrival order; codec errors become
    /// [`LinkEvent::Decode`] and decoding carries on after them.
    pub fn ingest(&self, channel: ChannelId, decoder: &mut FrameDecoder) {
        for item in decoder.drain() {
            match item {
                Ok(message) => self.deliver(channel, &message),
                Err(error) => {
                    self.shared.counters.rx_errors.fetch_add(1, Ordering::Relaxed);
                    debug!(%channel, %error, "dropping undecodable frame");
                    self.emit(LinkEvent::Decode { channel, error });
                }
            }
        }
    }

    /// Hand one decoded message to every subscriber.
    pub fn deliver(&self, channel: ChannelId, message: &Message) {
        self.shared
            .counters
            .rx_messages
            .fetch_add(1, Ordering::Relaxed);
        let handlers = read(&self.shared.message_handlers).clone();
        for handler in &handlers {
            handler(message, channel);
        }
    }

    /// Notify every event subscriber.
    pub fn emit(&self, event: LinkEvent) {
        let handlers = read(&self.shared.event_handlers).clone();
        for handler in &handlers {
            handler(&event);
        }
    }

    /// Report an unrecoverable transport failure and close the link.
    pub fn fail(&self, error: TransportError) {
        if self.is_closed() {
            debug!(channel = %self.channel(), %error, "ignoring failure on closed link");
            return;
        }
        warn!(channel = %self.channel(), %error, "transport failed");
        self.emit(LinkEvent::Failed(error));
        self.close();
    }

    pub fn record_rx(&self, bytes: usize) {
        self.shared
            .counters
            .rx_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.shared
            .counters
            .tx_dropped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> LinkStats {
        let c = &self.shared.counters;
        LinkStats {
            tx_bytes: c.tx_bytes.load(Ordering::Relaxed),
            tx_frames: c.tx_frames.load(Ordering::Relaxed),
            tx_dropped: c.tx_dropped.load(Ordering::Relaxed),
            rx_bytes: c.rx_bytes.load(Ordering::Relaxed),
            rx_messages: c.rx_messages.load(Ordering::Relaxed),
            rx_errors: c.rx_errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn attach(&self, handlers: Handlers) {
        write(&self.shared.message_handlers).extend(handlers.messages);
        write(&self.shared.event_handlers).extend(handlers.events);
    }

    pub(crate) fn subscribe(&self, handler: MessageHandler) {
        write(&self.shared.message_handlers).push(handler);
    }

    pub(crate) fn subscribe_events(&self, handler: EventHandler) {
        write(&self.shared.event_handlers).push(handler);
    }

    /// Attach the opened transport. A link that failed while the transport
    /// was still being constructed closes the transport straight away.
    pub(crate) fn install(&self, transport: Box<dyn Transport>) {
        let mut slot = lock(&self.shared.transport);
        if self.is_closed() {
            drop(slot);
            let mut transport = transport;
            transport.close();
            return;
        }
        *slot = Some(transport);
    }

    pub(crate) fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        let len = frame.len() as u64;
        let mut slot = lock(&self.shared.transport);
        let transport = slot.as_mut().ok_or(TransportError::Closed)?;
        transport.send(frame)?;
        drop(slot);

        let c = &self.shared.counters;
        c.tx_bytes.fetch_add(len, Ordering::Relaxed);
        c.tx_frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Close the transport and release the channel. Only the first call acts.
    pub(crate) fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Taken out before closing: a reader thread may be inside a handler
        // that is itself waiting on this lock to send.
        let transport = lock(&self.shared.transport).take();
        if let Some(mut transport) = transport {
            transport.close();
        }
        let lease = lock(&self.shared.lease).take();
        drop(lease);

        debug!(channel = %self.channel(), "link closed");
        self.emit(LinkEvent::Closed);
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("channel", &self.shared.channel)
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
