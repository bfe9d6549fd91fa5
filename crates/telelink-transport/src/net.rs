use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::TransportError;
use crate::url::HostPort;

/// Resolve `target` to every address it names.
pub(crate) fn resolve_all(
    transport: &'static str,
    target: &HostPort,
) -> Result<Vec<SocketAddr>, TransportError> {
    let resolve_err = |source: io::Error| TransportError::Resolve {
        transport,
        target: target.to_string(),
        source,
    };
    let addrs: Vec<SocketAddr> = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(resolve_err)?
        .collect();
    if addrs.is_empty() {
        return Err(resolve_err(io::Error::new(
            io::ErrorKind::NotFound,
            "host resolved to no addresses",
        )));
    }
    Ok(addrs)
}

/// Resolve `target` to its first address.
pub(crate) fn resolve(
    transport: &'static str,
    target: &HostPort,
) -> Result<SocketAddr, TransportError> {
    resolve_all(transport, target).map(|addrs| addrs[0])
}

/// Resolve `target`, preferring an address of the same family as `local`.
///
/// A socket bound to an IPv4 address cannot send to an IPv6 one, and names
/// like `localhost` often resolve to both.
pub(crate) fn resolve_for(
    transport: &'static str,
    target: &HostPort,
    local: SocketAddr,
) -> Result<SocketAddr, TransportError> {
    resolve_all(transport, target).map(|addrs| same_family(&addrs, local))
}

fn same_family(addrs: &[SocketAddr], local: SocketAddr) -> SocketAddr {
    addrs
        .iter()
        .find(|addr| addr.is_ipv4() == local.is_ipv4())
        .copied()
        .unwrap_or(addrs[0])
}

/// Errors a datagram socket reports for an earlier send (ICMP unreachable)
/// that do not affect the socket itself.
pub(crate) fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_family_prefers_matching_address() {
        let v6: SocketAddr = "[::1]:14550".parse().unwrap();
        let v4: SocketAddr = "127.0.0.1:14550".parse().unwrap();
        let any4: SocketAddr = "0.0.0.0:14555".parse().unwrap();
        let any6: SocketAddr = "[::]:14555".parse().unwrap();

        assert_eq!(same_family(&[v6, v4], any4), v4);
        assert_eq!(same_family(&[v4, v6], any6), v6);
        // Nothing matches: take what the resolver put first.
        assert_eq!(same_family(&[v6], any4), v6);
    }

    #[test]
    fn resolve_for_ipv4_bind_picks_ipv4() {
        let local: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let addr = resolve_for("udp", &HostPort::new("127.0.0.1", 14550), local).unwrap();
        assert_eq!(addr, "127.0.0.1:14550".parse().unwrap());
    }
}
