//! UDP transport.
//!
//! Binds a local address and exchanges datagrams with one remote. The remote
//! follows whoever sent the last datagram, so a descriptor with an empty
//! remote host replies to the first peer that talks.

use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::time::Duration;

use bytes::Bytes;
use telelink_frame::FrameDecoder;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::error::TransportError;
use crate::link::Link;
use crate::net::{is_transient, resolve, resolve_for};
use crate::reactor::{Reactor, ReactorTask};
use crate::traits::Transport;
use crate::url::HostPort;

const NAME: &str = "udp";

/// Largest datagram a UDP socket can deliver.
const MAX_DATAGRAM: usize = 65_535;

pub struct UdpTransport {
    outbound: mpsc::UnboundedSender<Bytes>,
    task: ReactorTask,
    local_addr: SocketAddr,
    close_timeout: Duration,
}

impl UdpTransport {
    /// Bind `bind` and start exchanging datagrams on `reactor`.
    ///
    /// An empty `remote` host leaves the remote unknown until the first
    /// datagram arrives; frames sent before then are dropped.
    pub fn open(
        link: &Link,
        reactor: &Reactor,
        bind: &HostPort,
        remote: &HostPort,
        config: &LinkConfig,
    ) -> Result<Self, TransportError> {
        let bind_addr = resolve(NAME, bind)?;
        let remote_addr = if remote.host.is_empty() {
            None
        } else {
            Some(resolve_for(NAME, remote, bind_addr)?)
        };

        let bind_err = |source: std::io::Error| TransportError::Bind {
            transport: NAME,
            addr: bind_addr,
            source,
        };
        let socket = StdUdpSocket::bind(bind_addr).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;
        let socket = {
            let _guard = reactor.enter()?;
            UdpSocket::from_std(socket).map_err(bind_err)?
        };

        let channel = link.channel();
        let (outbound, rx) = mpsc::unbounded_channel();
        let linger = config.close_timeout;
        let task = {
            let owner = link.clone();
            reactor.spawn_task(link, move |token| {
                run(socket, remote_addr, rx, token, owner, linger)
            })?
        };

        info!(%channel, %local_addr, remote = ?remote_addr, "udp endpoint bound");
        Ok(Self {
            outbound,
            task,
            local_addr,
            close_timeout: config.close_timeout,
        })
    }
}

impl Transport for UdpTransport {
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

async fn run(
    socket: UdpSocket,
    mut remote: Option<SocketAddr>,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    token: CancellationToken,
    link: Link,
    linger: Duration,
) {
    let channel = link.channel();
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                if let Some(addr) = remote {
                    let flush = async {
                        while let Ok(frame) = outbound.try_recv() {
                            if socket.send_to(&frame, addr).await.is_err() {
                                break;
                            }
                        }
                    };
                    let _ = tokio::time::timeout(linger, flush).await;
                }
                break;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, from)) => {
                    if remote != Some(from) {
                        info!(%channel, %from, "udp remote updated");
                        remote = Some(from);
                    }
                    link.record_rx(n);
                    decoder.push(&buf[..n]);
                    link.ingest(channel, &mut decoder);
                }
                Err(e) if is_transient(&e) => {
                    debug!(%channel, error = %e, "ignoring transient udp error");
                }
                Err(source) => {
                    link.fail(TransportError::Io { transport: NAME, source });
                    break;
                }
            },
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                let Some(addr) = remote else {
                    debug!(%channel, "no udp remote yet, dropping frame");
                    link.record_dropped();
                    continue;
                };
                if let Err(e) = socket.send_to(&frame, addr).await {
                    if is_transient(&e) {
                        debug!(%channel, %addr, error = %e, "udp send failed");
                        link.record_dropped();
                    } else {
                        link.fail(TransportError::Io { transport: NAME, source: e });
                        break;
                    }
                }
            }
        }
    }
    debug!(%channel, "udp task finished");
}
