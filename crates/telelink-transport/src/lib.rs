//! Transport and connection layer for telemetry links.
//!
//! Turns a textual endpoint descriptor into a live, bidirectional
//! [`Connection`] over one of:
//! - a serial device (dedicated reader thread)
//! - UDP (bind address plus learned or fixed remote)
//! - TCP client
//! - TCP listener (one channel per accepted peer)
//!
//! Socket transports run on a single shared [`Reactor`] thread. Every live
//! endpoint holds a [`ChannelId`] from a bounded [`ChannelRegistry`] for as long
//! as it is open.

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod factory;
pub mod link;
pub mod reactor;
#[cfg(unix)]
pub mod serial;
pub mod tcp;
pub mod tcp_server;
pub mod traits;
pub mod udp;
pub mod url;

mod net;

pub use channel::{ChannelId, ChannelLease, ChannelRegistry, MAX_CHANNELS};
pub use config::LinkConfig;
pub use connection::Connection;
pub use error::{DescriptorError, Error, Result, TransportError};
pub use factory::{open, ConnectionFactory};
pub use link::{Handlers, Link, LinkEvent, LinkStats};
pub use reactor::Reactor;
pub use traits::Transport;
pub use url::{parse, Descriptor, Endpoint, HostPort, Identity, Scheme};

pub use telelink_frame::Message;
