//! Telemetry links over serial, UDP and TCP.
//!
//! telelink turns an endpoint descriptor such as `udp://0.0.0.0:14555@` or
//! `serial:///dev/ttyUSB0:115200` into a live connection that exchanges framed
//! telemetry messages.
//!
//! # Crate Structure
//!
//! - [`transport`] — descriptors, channel pool, transports and connections
//! - [`frame`] — message framing and CRC
//!
//! ```no_run
//! let conn = telelink::open("tcp://127.0.0.1:5760", 1, 240)?;
//! conn.subscribe(|msg, channel| println!("{channel}: msg {}", msg.msg_id));
//! conn.send_message(0, &[0; 9])?;
//! # Ok::<(), telelink::Error>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use telelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use telelink_frame::*;
}

pub use telelink_transport::{
    open, parse, Connection, ConnectionFactory, Descriptor, Error, Handlers, LinkEvent, Message,
    Result,
};
