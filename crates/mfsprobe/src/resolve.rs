//! Hostname resolution into IPv4 endpoints.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};

use mfsprobe_topology::Endpoint;

/// Split a host list on `;`, `,` and whitespace, dropping empty items.
pub fn split_hosts(hosts: &str) -> Vec<&str> {
    hosts
        .split(|c: char| c == ';' || c == ',' || c.is_whitespace())
        .filter(|h| !h.is_empty())
        .collect()
}

/// Resolve every host in `hosts` to IPv4 endpoints on `port`.
///
/// Hosts that fail to resolve are skipped. The result keeps first-seen
/// order with duplicates removed; an empty result means nothing resolved.
pub async fn resolve_endpoints(hosts: &str, port: u16) -> Vec<Endpoint> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for host in split_hosts(hosts) {
        let addrs = match tokio::net::lookup_host((host, port)).await {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!(host, error = %e, "can't resolve host");
                continue;
            }
        };
        for addr in addrs {
            let SocketAddr::V4(v4) = addr else {
                continue;
            };
            let endpoint = Endpoint::from(v4);
            if seen.insert(endpoint) {
                debug!(host, %endpoint, "resolved");
                out.push(endpoint);
            }
        }
    }
    out
}

/// Parse `ip` or `ip:port` without touching the resolver.
pub fn parse_endpoint(s: &str, default_port: u16) -> Option<Endpoint> {
    if let Ok(SocketAddr::V4(v4)) = s.parse::<SocketAddr>() {
        return Some(v4.into());
    }
    match s.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => Some(Endpoint::new(ip, default_port)),
        _ => None,
    }
}
