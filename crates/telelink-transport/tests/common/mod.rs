#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use telelink_transport::{ChannelRegistry, ConnectionFactory, Reactor};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A factory with its own registry and reactor, isolated from other tests.
pub fn isolated_factory() -> ConnectionFactory {
    let reactor = Reactor::start().unwrap();
    ConnectionFactory::new(Arc::new(ChannelRegistry::new())).with_reactor(reactor)
}

/// Poll `cond` until it holds or [`TIMEOUT`] passes.
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}
