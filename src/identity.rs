use std::net::SocketAddr;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Where the client's IP address comes from. Selected by configuration;
/// there is deliberately no silent fallback from one strategy to the other.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IdentitySource {
    /// Read the address from a header injected by a fronting reverse proxy.
    /// The proxy is trusted to have set it; nothing here verifies it.
    TrustedHeader { header: String },
    /// Use the peer address of the TCP connection.
    SocketAddr,
}

impl Default for IdentitySource {
    fn default() -> Self {
        Self::TrustedHeader {
            header: "Cf-Connecting-Ip".to_owned(),
        }
    }
}

impl IdentitySource {
    /// Resolve the client IP for a request, or `None` when the configured
    /// source did not produce one (missing or non-UTF-8 trusted header).
    pub fn client_ip(&self, headers: &HeaderMap, peer: SocketAddr) -> Option<String> {
        match self {
            Self::TrustedHeader { header } => headers
                .get(header.as_str())
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty()),
            Self::SocketAddr => Some(peer.ip().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 7], 40000))
    }

    #[test]
    fn trusted_header_reads_configured_header() {
        let source = IdentitySource::default();
        let mut headers = HeaderMap::new();
        headers.insert("Cf-Connecting-Ip", HeaderValue::from_static("1.2.3.4"));
        assert_eq!(source.client_ip(&headers, peer()).as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn trusted_header_absent_yields_none_not_peer() {
        let source = IdentitySource::default();
        assert_eq!(source.client_ip(&HeaderMap::new(), peer()), None);
    }

    #[test]
    fn socket_addr_uses_peer_ip() {
        let source = IdentitySource::SocketAddr;
        assert_eq!(
            source.client_ip(&HeaderMap::new(), peer()).as_deref(),
            Some("10.0.0.7")
        );
    }
}
