// ── Device inventory entries ──

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use l2tpv6_transport::Transport;

/// One row of a host list. Identity is `(address, label)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostEntry {
    pub address: String,
    pub label: String,
    pub transport: Transport,
}

impl HostEntry {
    pub fn new(address: impl Into<String>, label: impl Into<String>, transport: Transport) -> Self {
        Self {
            address: address.into(),
            label: label.into(),
            transport,
        }
    }
}

impl fmt::Display for HostEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.address)
    }
}

/// Which side of the L2TP tunnels a device sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Server,
    Client,
}
