//! Turns endpoint descriptors into live connections.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::channel::ChannelRegistry;
use crate::config::LinkConfig;
use crate::connection::Connection;
use crate::error::{Result, TransportError};
use crate::link::{Handlers, Link};
use crate::reactor::Reactor;
use crate::tcp::TcpClientTransport;
use crate::tcp_server::TcpServerTransport;
use crate::traits::Transport;
use crate::udp::UdpTransport;
use crate::url::{Descriptor, Endpoint, Identity};

#[derive(Debug, Clone)]
enum ReactorSource {
    Shared,
    Owned(Arc<Reactor>),
}

/// Opens connections against one channel registry and one reactor.
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    registry: Arc<ChannelRegistry>,
    reactor: ReactorSource,
    config: LinkConfig,
}

impl ConnectionFactory {
    /// Factory over `registry`, using the process-wide reactor for sockets.
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self {
            registry,
            reactor: ReactorSource::Shared,
            config: LinkConfig::default(),
        }
    }

    /// Factory over the process-wide registry and reactor.
    pub fn shared() -> Self {
        Self::new(ChannelRegistry::global())
    }

    /// Drive socket transports on `reactor` instead of the shared one.
    pub fn with_reactor(mut self, reactor: Arc<Reactor>) -> Self {
        self.reactor = ReactorSource::Owned(reactor);
        self
    }

    pub fn with_config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Parse `text` and open the endpoint it names.
    ///
    /// `system_id`/`component_id` are used unless the descriptor carries an
    /// `ids=` override.
    pub fn open(&self, text: &str, system_id: u8, component_id: u8) -> Result<Connection> {
        self.open_subscribed(text, system_id, component_id, Handlers::new())
    }

    /// Like [`open`](Self::open), with `handlers` in place before the
    /// transport reads its first byte.
    ///
    /// Use this when the peer may talk first: a frame that arrives before
    /// [`Connection::subscribe`] runs is counted but reaches no handler.
    pub fn open_subscribed(
        &self,
        text: &str,
        system_id: u8,
        component_id: u8,
        handlers: Handlers,
    ) -> Result<Connection> {
        let descriptor = Descriptor::parse(text)?;
        self.open_descriptor(&descriptor, Identity::new(system_id, component_id), handlers)
    }

    /// Open an already-parsed descriptor.
    pub fn open_descriptor(
        &self,
        descriptor: &Descriptor,
        defaults: Identity,
        handlers: Handlers,
    ) -> Result<Connection> {
        let identity = descriptor.identity_or(defaults);
        debug!(%descriptor, ?identity, ?handlers, "opening endpoint");

        match descriptor.endpoint() {
            Endpoint::Serial { path, baud } => self.open_serial(identity, handlers, path, *baud),
            Endpoint::Udp { bind, remote } => self.open_with(identity, handlers, |link| {
                let reactor = self.reactor()?;
                UdpTransport::open(link, &reactor, bind, remote, &self.config)
            }),
            Endpoint::Tcp(target) => self.open_with(identity, handlers, |link| {
                let reactor = self.reactor()?;
                TcpClientTransport::connect(link, &reactor, target, &self.config)
            }),
            Endpoint::TcpListen(addr) => self.open_with(identity, handlers, |link| {
                let reactor = self.reactor()?;
                TcpServerTransport::bind(link, &reactor, addr, &self.config)
            }),
        }
    }

    /// Lease a channel, attach `handlers` and build a transport on it with
    /// `open`.
    ///
    /// If `open` fails the channel is returned to the registry before the
    /// error is handed back. This is the extension point for transports
    /// defined outside this crate.
    pub fn open_with<T, F>(&self, identity: Identity, handlers: Handlers, open: F) -> Result<Connection>
    where
        T: Transport,
        F: FnOnce(&Link) -> std::result::Result<T, TransportError>,
    {
        let lease = self.registry.lease()?;
        let link = Link::new(lease, Arc::clone(&self.registry));
        let channel = link.channel();
        link.attach(handlers);

        match open(&link) {
            Ok(transport) => {
                let name = transport.name();
                let local_addr = transport.local_addr();
                link.install(Box::new(transport));
                info!(%channel, transport = name, ?local_addr, "endpoint open");
                Ok(Connection::new(link, identity, name, local_addr))
            }
            Err(err) => {
                error!(%channel, error = %err, "failed to open endpoint");
                link.close();
                Err(err.into())
            }
        }
    }

    #[cfg(unix)]
    fn open_serial(
        &self,
        identity: Identity,
        handlers: Handlers,
        path: &str,
        baud: u32,
    ) -> Result<Connection> {
        self.open_with(identity, handlers, |link| {
            crate::serial::SerialTransport::open(link, path, baud, &self.config)
        })
    }

    #[cfg(not(unix))]
    fn open_serial(
        &self,
        identity: Identity,
        handlers: Handlers,
        path: &str,
        _baud: u32,
    ) -> Result<Connection> {
        self.open_with(identity, handlers, |_link| {
            Err::<crate::tcp::TcpClientTransport, _>(TransportError::Open {
                transport: "serial",
                target: path.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::Unsupported),
            })
        })
    }

    fn reactor(&self) -> std::result::Result<Arc<Reactor>, TransportError> {
        match &self.reactor {
            ReactorSource::Shared => Reactor::shared(),
            ReactorSource::Owned(reactor) => Ok(Arc::clone(reactor)),
        }
    }
}

/// Open `text` with the process-wide registry and reactor.
pub fn open(text: &str, system_id: u8, component_id: u8) -> Result<Connection> {
    ConnectionFactory::shared().open(text, system_id, component_id)
}
