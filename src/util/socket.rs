//! UDP socket wrangling
// (c) 2024 Ross Younger

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, UdpSocket};

use anyhow::Context as _;
use tracing::debug;

/// Creates and binds a UDP socket for the address family necessary to reach the given peer address
pub fn bind_unspecified_for(peer: &SocketAddr) -> anyhow::Result<UdpSocket> {
    let addr: SocketAddr = match peer {
        SocketAddr::V4(_) => SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0).into(),
    };
    UdpSocket::bind(addr).with_context(|| format!("failed to bind UDP socket to {addr}"))
}

/// Binds the server's listening socket.
///
/// We prefer the IPv6 wildcard, which on most platforms also receives IPv4;
/// if the host has no IPv6 we fall back to IPv4 only.
pub fn bind_server(port: u16) -> anyhow::Result<UdpSocket> {
    let v6 = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0);
    match UdpSocket::bind(v6) {
        Ok(s) => Ok(s),
        Err(e) => {
            debug!("could not bind {v6} ({e}), trying IPv4");
            let v4 = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
            UdpSocket::bind(v4).with_context(|| format!("failed to bind UDP port {port}"))
        }
    }
}
