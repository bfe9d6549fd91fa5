//! TCP client transport, plus the stream pump shared with the listener.

use std::net::{SocketAddr, TcpStream as StdTcpStream};
use std::time::Duration;

use bytes::Bytes;
use telelink_frame::FrameDecoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::channel::ChannelId;
use crate::config::LinkConfig;
use crate::error::TransportError;
use crate::link::Link;
use crate::net::resolve_all;
use crate::reactor::{Reactor, ReactorTask};
use crate::traits::Transport;
use crate::url::HostPort;

const NAME: &str = "tcp";

pub struct TcpClientTransport {
    outbound: mpsc::UnboundedSender<Bytes>,
    task: ReactorTask,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    close_timeout: Duration,
}

impl TcpClientTransport {
    /// Connect to `target`, trying each resolved address in turn.
    ///
    /// The connect itself is synchronous and bounded by
    /// [`LinkConfig::connect_timeout`]; afterwards the stream is driven by
    /// `reactor`.
    pub fn connect(
        link: &Link,
        reactor: &Reactor,
        target: &HostPort,
        config: &LinkConfig,
    ) -> Result<Self, TransportError> {
        let connect_err = |source: std::io::Error| TransportError::Connect {
            transport: NAME,
            target: target.to_string(),
            source,
        };

        let mut last_err = None;
        let mut connected = None;
        for addr in resolve_all(NAME, target)? {
            match StdTcpStream::connect_timeout(&addr, config.connect_timeout) {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(e) => {
                    debug!(%addr, error = %e, "tcp connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        let stream = match (connected, last_err) {
            (Some(stream), _) => stream,
            (None, Some(e)) => return Err(connect_err(e)),
            (None, None) => return Err(connect_err(std::io::ErrorKind::NotFound.into())),
        };

        stream.set_nodelay(true).map_err(connect_err)?;
        stream.set_nonblocking(true).map_err(connect_err)?;
        let local_addr = stream.local_addr().map_err(connect_err)?;
        let peer_addr = stream.peer_addr().map_err(connect_err)?;
        let stream = {
            let _guard = reactor.enter()?;
            TcpStream::from_std(stream).map_err(connect_err)?
        };

        let channel = link.channel();
        let (outbound, rx) = mpsc::unbounded_channel();
        let task = {
            let owner = link.clone();
            let linger = config.close_timeout;
            reactor.spawn_task(link, move |token| async move {
                let link = owner;
                let ended = pump_stream(stream, rx, &token, &link, channel, NAME, linger).await;
                if let Some(err) = ended {
                    link.fail(err);
                }
            })?
        };

        info!(%channel, %peer_addr, %local_addr, "tcp connected");
        Ok(Self {
            outbound,
            task,
            local_addr,
            peer_addr,
            close_timeout: config.close_timeout,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Transport for TcpClientTransport {
    fn name(&self) -> &'static str {
        NAME
    }

    fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        self.task.stop(self.close_timeout);
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }
}

/// Move bytes between `stream` and `link` until cancelled or the stream ends.
///
/// Inbound bytes are decoded and dispatched tagged with `channel`; frames
/// from `outbound` are written in order. On cancellation, frames still
/// queued are flushed for at most `linger` before the write side is shut
/// down. Returns the error that ended the stream, or `None` after
/// cancellation.
pub(crate) async fn pump_stream(
    mut stream: TcpStream,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    token: &CancellationToken,
    link: &Link,
    channel: ChannelId,
    transport: &'static str,
    linger: Duration,
) -> Option<TransportError> {
    let mut decoder = FrameDecoder::new();
    let io_err = |source: std::io::Error| TransportError::Io { transport, source };

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                let flush = async {
                    while let Ok(frame) = outbound.try_recv() {
                        stream.write_all(&frame).await?;
                    }
                    stream.shutdown().await
                };
                if let Ok(Err(e)) = tokio::time::timeout(linger, flush).await {
                    debug!(%channel, error = %e, "tcp flush on close failed");
                }
                return None;
            }
            read = stream.read_buf(decoder.buffer_mut()) => match read {
                Ok(0) => return Some(TransportError::Disconnected { transport }),
                Ok(n) => {
                    link.record_rx(n);
                    link.ingest(channel, &mut decoder);
                }
                Err(e) => return Some(io_err(e)),
            },
            frame = outbound.recv() => {
                let Some(frame) = frame else { return None };
                if let Err(e) = stream.write_all(&frame).await {
                    return Some(io_err(e));
                }
            }
        }
    }
}
