//! Client address resolution behind trusted reverse proxies.

use axum::http::HeaderMap;
use sqlx::types::ipnetwork::IpNetwork;
use std::net::IpAddr;

#[derive(Debug, Clone, Default)]
pub struct ClientIpConfig {
    /// Headers to scan, most specific first (e.g. `X-Forwarded-For`).
    pub headers: Vec<String>,
    /// Proxy addresses or CIDR ranges allowed to speak for the client.
    pub trusted_proxies: Vec<IpNetwork>,
}

impl ClientIpConfig {
    fn is_trusted(&self, ip: IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(ip))
    }

    /// The peer address, unless it is a trusted proxy. Then each header is read from the
    /// right, skipping trusted hops, and the first other address is the client.
    ///
    /// Entries left of that address were written by the client and are never used.
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
        if self.headers.is_empty() || self.trusted_proxies.is_empty() {
            return peer;
        }
        match peer {
            Some(ip) if !self.is_trusted(ip) => return peer,
            _ => {}
        }

        for name in &self.headers {
            let hops: Vec<&str> = headers
                .get_all(name.as_str())
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|value| value.split(','))
                .collect();

            for hop in hops.into_iter().rev() {
                let Ok(ip) = hop.trim().parse::<IpAddr>() else {
                    // A garbled hop means the chain cannot be trusted past this point
                    break;
                };
                if !self.is_trusted(ip) {
                    return Some(ip);
                }
            }
        }
        peer
    }
}

/// Parse `HTTP_IP_PROXIES` entries; bare addresses become single-host networks.
pub fn parse_trusted_proxies(entries: &[String]) -> Result<Vec<IpNetwork>, anyhow::Error> {
    entries
        .iter()
        .map(|entry| {
            entry
                .parse::<IpNetwork>()
                .map_err(|e| anyhow::anyhow!("'{}': {}", entry, e))
        })
        .collect()
}
