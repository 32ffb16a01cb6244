//! Requester address resolution.

use crate::modules::access_control::canonical_ip;
use http::HeaderMap;
use ipnet::IpNet;
use std::net::IpAddr;

/// Picks the address access rules are evaluated against.
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trust_proxy_headers: bool,
    trusted_proxies: Vec<IpNet>,
}

impl ClientIpResolver {
    /// Create a resolver.
    ///
    /// With `trust_proxy_headers` unset the peer address is always used.
    /// With a non-empty `trusted_proxies` list, headers are only honored
    /// when the peer is inside one of the listed networks.
    #[must_use]
    pub fn new(trust_proxy_headers: bool, trusted_proxies: Vec<IpNet>) -> Self {
        Self {
            trust_proxy_headers,
            trusted_proxies,
        }
    }

    /// Resolve the client address for a connection from `peer`.
    #[must_use]
    pub fn resolve(&self, peer: IpAddr, headers: &HeaderMap) -> IpAddr {
        let peer = canonical_ip(peer);

        if !self.trust_proxy_headers {
            return peer;
        }

        if !self.trusted_proxies.is_empty()
            && !self.trusted_proxies.iter().any(|net| net.contains(&peer))
        {
            return peer;
        }

        // Leftmost X-Forwarded-For entry is the original client.
        if let Some(ip) = header_ip(headers, "x-forwarded-for", |v| v.split(',').next()) {
            return ip;
        }

        if let Some(ip) = header_ip(headers, "x-real-ip", Some) {
            return ip;
        }

        peer
    }
}

fn header_ip<'a>(
    headers: &'a HeaderMap,
    name: &str,
    pick: impl Fn(&'a str) -> Option<&'a str>,
) -> Option<IpAddr> {
    let value = headers.get(name)?.to_str().ok()?;
    pick(value)?.trim().parse().ok().map(canonical_ip)
}
