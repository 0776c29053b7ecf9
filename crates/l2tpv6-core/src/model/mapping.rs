// ── Address mappings ──

use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

use super::cidr::Ipv6Cidr;

/// Links a named L2TP tunnel on the server to the client block behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelMapping {
    /// Matched case-insensitively as a substring of live interface names.
    pub tunnel_name: String,
    pub client_label: String,
    /// Address placed on the server end of the tunnel.
    pub server_ipv6_cidr: Ipv6Cidr,
    /// Next hop for the client network, the client end of the tunnel.
    pub server_gateway: Ipv6Addr,
    pub client_network_cidr: Ipv6Cidr,
    pub client_gateway: Ipv6Addr,
}

impl TunnelMapping {
    /// Whether this mapping claims the live interface `interface`.
    pub fn matches(&self, interface: &str) -> bool {
        interface
            .to_lowercase()
            .contains(&self.tunnel_name.to_lowercase())
    }

    /// Comment attached to the server route, e.g. `Route-CAETITE`.
    pub fn route_comment(&self) -> String {
        format!("Route-{}", self.tunnel_name.to_uppercase())
    }
}

/// Per-client bridge addressing, keyed by `client_label`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMapping {
    pub client_label: String,
    pub bridge_interface: String,
    pub bridge_ipv6_cidr: Ipv6Cidr,
    pub default_gateway: Ipv6Addr,
}

/// Comment attached to client default routes.
pub const DEFAULT_ROUTE_COMMENT: &str = "Default-via-L2TP";
