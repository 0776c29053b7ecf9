// ── IPv6 address/prefix values ──

use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use ipnetwork::Ipv6Network;
use serde::{Deserialize, Serialize};

/// An interface address or route destination in `addr/prefix` form.
///
/// The host bits are kept as written (`2804::11/126` stays `::11`), so the
/// same type serves interface addresses and route destinations. Comparison
/// helpers decide which normalization applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv6Cidr(Ipv6Network);

impl Ipv6Cidr {
    pub fn new(address: Ipv6Addr, prefix: u8) -> Result<Self, CidrError> {
        Ipv6Network::new(address, prefix)
            .map(Self)
            .map_err(|e| CidrError(e.to_string()))
    }

    pub fn address(&self) -> Ipv6Addr {
        self.0.ip()
    }

    pub fn prefix(&self) -> u8 {
        self.0.prefix()
    }

    /// The masked network address.
    pub fn network(&self) -> Ipv6Addr {
        self.0.network()
    }

    /// `network/prefix`, the form RouterOS stores route destinations in.
    pub fn network_cidr(&self) -> Self {
        Self(Ipv6Network::new(self.network(), self.prefix()).unwrap_or(self.0))
    }

    /// Same interface address: identical address and prefix length.
    pub fn same_address(&self, other: &Self) -> bool {
        self.address() == other.address() && self.prefix() == other.prefix()
    }

    /// Same route destination: identical masked network and prefix length.
    pub fn same_network(&self, other: &Self) -> bool {
        self.network() == other.network() && self.prefix() == other.prefix()
    }

    /// Whether this block lies entirely inside `outer`.
    pub fn is_within(&self, outer: &Self) -> bool {
        self.prefix() >= outer.prefix() && outer.0.contains(self.address())
    }

    /// `::/0`.
    pub fn default_route() -> Self {
        Self(
            Ipv6Network::new(Ipv6Addr::UNSPECIFIED, 0)
                .unwrap_or_else(|_| Ipv6Network::from(Ipv6Addr::UNSPECIFIED)),
        )
    }

    pub fn is_default_route(&self) -> bool {
        self.prefix() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CidrError(String);

impl FromStr for Ipv6Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some((addr, prefix)) = s.split_once('/') else {
            return Err(CidrError("missing '/prefix'".into()));
        };
        let addr: Ipv6Addr = addr
            .parse()
            .map_err(|_| CidrError(format!("'{addr}' is not an IPv6 address")))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| CidrError(format!("'{prefix}' is not a prefix length")))?;
        Self::new(addr, prefix)
    }
}

impl TryFrom<String> for Ipv6Cidr {
    type Error = CidrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv6Cidr> for String {
    fn from(value: Ipv6Cidr) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Ipv6Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address(), self.prefix())
    }
}

/// Parse a gateway as RouterOS prints it, dropping any `%interface` scope.
pub fn parse_gateway(raw: &str) -> Option<Ipv6Addr> {
    let raw = raw.trim().trim_matches('"');
    let addr = raw.split_once('%').map_or(raw, |(addr, _)| addr);
    addr.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> Ipv6Cidr {
        s.parse().unwrap()
    }

    #[test]
    fn keeps_host_bits_but_compares_networks() {
        let addr = cidr("2804:385c:8700::11/126");
        assert_eq!(addr.to_string(), "2804:385c:8700::11/126");
        assert_eq!(addr.network_cidr().to_string(), "2804:385c:8700::10/126");
        assert!(addr.same_network(&cidr("2804:385c:8700::10/126")));
        assert!(!addr.same_address(&cidr("2804:385c:8700::10/126")));
    }

    #[test]
    fn equivalent_spellings_are_the_same_address() {
        assert!(cidr("2804:385C:8700:0::11/126").same_address(&cidr("2804:385c:8700::11/126")));
        assert!(!cidr("2804:385c:8700::11/126").same_address(&cidr("2804:385c:8700::11/64")));
    }

    #[test]
    fn rejects_missing_prefix_and_ipv4() {
        assert!("2804:385c:8700::11".parse::<Ipv6Cidr>().is_err());
        assert!("10.0.0.1/24".parse::<Ipv6Cidr>().is_err());
        assert!("2804::1/129".parse::<Ipv6Cidr>().is_err());
    }

    #[test]
    fn containment_respects_prefix_length() {
        let base = cidr("2804:385c:8700::/48");
        assert!(cidr("2804:385c:8700::14/126").is_within(&base));
        assert!(!cidr("2804:385c::/32").is_within(&base));
        assert!(!cidr("2001:db8::1/64").is_within(&base));
    }

    #[test]
    fn gateway_scope_suffix_is_ignored() {
        let gw: Ipv6Addr = "2804:385c:8700::12".parse().unwrap();
        assert_eq!(parse_gateway("2804:385c:8700::12%l2tp-caetite"), Some(gw));
        assert_eq!(parse_gateway("2804:385c:8700::12"), Some(gw));
        assert_eq!(parse_gateway("bridge"), None);
    }

    #[test]
    fn default_route_renders_like_routeros() {
        assert_eq!(Ipv6Cidr::default_route().to_string(), "::/0");
        assert!(Ipv6Cidr::default_route().same_network(&cidr("::/0")));
    }
}
