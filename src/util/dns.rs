// DNS helpers
// (c) 2024 Ross Younger

use std::net::IpAddr;

use anyhow::Context as _;

/// Representation of an IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AddressFamily {
    /// Whatever the resolver returns first
    Any,
    /// IPv4 only
    IPv4,
    /// IPv6 only
    IPv6,
}

/// DNS lookup helper
/// Results can be restricted to a given address family.
/// Only the first matching result is returned.
/// If there are no matching records of the required type, returns an error.
pub fn lookup_host_by_family(host: &str, desired: AddressFamily) -> anyhow::Result<IpAddr> {
    // Literal addresses need no lookup, but must still honour the requested family.
    let candidates = if let Ok(ip) = host.parse::<IpAddr>() {
        vec![ip]
    } else {
        dns_lookup::lookup_host(host).with_context(|| format!("host name lookup for {host} failed"))?
    };
    let mut it = candidates.iter();

    let found = match desired {
        AddressFamily::Any => it.next(),
        AddressFamily::IPv4 => it.find(|addr| addr.is_ipv4()),
        AddressFamily::IPv6 => it.find(|addr| addr.is_ipv6()),
    };
    found
        .copied()
        .ok_or(anyhow::anyhow!("host {host} found, but not as {desired}"))
}
