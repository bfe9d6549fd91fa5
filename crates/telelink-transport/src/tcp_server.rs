//! TCP listener transport.
//!
//! Every accepted peer leases its own channel from the listener's registry
//! for as long as it stays connected; a peer that arrives when the registry
//! is exhausted is dropped. Sends are broadcast to all connected peers.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::{ChannelId, ChannelLease};
use crate::config::LinkConfig;
use crate::error::TransportError;
use crate::link::{lock, Link, LinkEvent};
use crate::net::resolve;
use crate::reactor::{Reactor, ReactorTask};
use crate::tcp::pump_stream;
use crate::traits::Transport;
use crate::url::HostPort;

const NAME: &str = "tcp-listen";

#[derive(Debug)]
struct Peer {
    addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Bytes>,
}

type PeerMap = Arc<Mutex<HashMap<ChannelId, Peer>>>;

pub struct TcpServerTransport {
    peers: PeerMap,
    task: ReactorTask,
    local_addr: SocketAddr,
    link: Link,
    close_timeout: Duration,
}

impl TcpServerTransport {
    /// Bind `addr` and accept peers on `reactor`.
    pub fn bind(
        link: &Link,
        reactor: &Reactor,
        addr: &HostPort,
        config: &LinkConfig,
    ) -> Result<Self, TransportError> {
        let bind_addr = resolve(NAME, addr)?;
        let bind_err = |source: io::Error| TransportError::Bind {
            transport: NAME,
            addr: bind_addr,
            source,
        };

        let listener = StdTcpListener::bind(bind_addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        let listener = {
            let _guard = reactor.enter()?;
            TcpListener::from_std(listener).map_err(bind_err)?
        };

        let peers = PeerMap::default();
        let task = {
            let peers = Arc::clone(&peers);
            let owner = link.clone();
            let linger = config.close_timeout;
            reactor.spawn_task(link, move |token| {
                accept_loop(listener, peers, token, owner, linger)
            })?
        };

        info!(channel = %link.channel(), %local_addr, "tcp listening");
        Ok(Self {
            peers,
            task,
            local_addr,
            link: link.clone(),
            close_timeout: config.close_timeout,
        })
    }

    /// Number of currently connected peers.
    pub fn peer_count(&self) -> usize {
        lock(&self.peers).len()
    }
}

impl Transport for TcpServerTransport {
    fn name(&self) -> &'static str {
        NAME
    }

    fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let peers = lock(&self.peers);
        if peers.is_empty() {
            debug!(channel = %self.link.channel(), "no tcp peers, dropping frame");
            self.link.record_dropped();
            return Ok(());
        }
        for (channel, peer) in peers.iter() {
            if peer.outbound.send(frame.clone()).is_err() {
                debug!(%channel, addr = %peer.addr, "tcp peer already gone");
            }
        }
        Ok(())
    }

    /// Stops accepting, flushes and disconnects every peer, and returns
    /// their channels before the listener's own.
    fn close(&mut self) {
        self.task.stop(self.close_timeout);
        lock(&self.peers).clear();
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }
}

async fn accept_loop(
    listener: TcpListener,
    peers: PeerMap,
    token: CancellationToken,
    link: Link,
    linger: Duration,
) {
    let mut sessions = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            Some(_) = sessions.join_next(), if !sessions.is_empty() => continue,
            accepted = listener.accept() => accepted,
        };
        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(e) if is_transient_accept(&e) => {
                debug!(error = %e, "ignoring failed accept");
                continue;
            }
            Err(source) => {
                link.fail(TransportError::Accept {
                    transport: NAME,
                    source,
                });
                break;
            }
        };

        let lease = match link.registry().lease() {
            Ok(lease) => lease,
            Err(err) => {
                warn!(%addr, error = %err, "rejecting tcp peer");
                drop(stream);
                continue;
            }
        };
        let channel = lease.id();
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%channel, error = %e, "could not set TCP_NODELAY");
        }

        let (outbound, rx) = mpsc::unbounded_channel();
        lock(&peers).insert(channel, Peer { addr, outbound });
        info!(%channel, %addr, "tcp peer connected");
        link.emit(LinkEvent::PeerConnected { channel, addr });

        sessions.spawn(serve_peer(
            stream,
            rx,
            lease,
            addr,
            Arc::clone(&peers),
            token.child_token(),
            link.clone(),
            linger,
        ));
    }

    drop(listener);
    while sessions.join_next().await.is_some() {}
    debug!("tcp accept loop finished");
}

#[allow(clippy::too_many_arguments)]
async fn serve_peer(
    stream: TcpStream,
    outbound: mpsc::UnboundedReceiver<Bytes>,
    lease: ChannelLease,
    addr: SocketAddr,
    peers: PeerMap,
    token: CancellationToken,
    link: Link,
    linger: Duration,
) {
    let channel = lease.id();
    if let Some(err) = pump_stream(stream, outbound, &token, &link, channel, NAME, linger).await {
        debug!(%channel, %addr, error = %err, "tcp peer stream ended");
    }

    lock(&peers).remove(&channel);
    drop(lease);
    info!(%channel, %addr, "tcp peer disconnected");
    link.emit(LinkEvent::PeerDisconnected { channel, addr });
}

fn is_transient_accept(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
