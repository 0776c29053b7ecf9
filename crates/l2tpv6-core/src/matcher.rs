// ── Tunnel matcher ──
//
// Pairs live tunnel interfaces with declared mappings. A mapping claims an
// interface when its `tunnel_name` is a case-insensitive substring of the
// interface name. When several mappings claim one interface the first in
// file order wins and the rest are reported as ambiguous. A mapping wins at
// most one interface; later interfaces it would win are reported as
// conflicts so the same address is never applied twice.

use indexmap::IndexMap;
use serde::Serialize;

use crate::model::TunnelMapping;

/// What the matcher decided for one discovered interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceMatch<'a> {
    pub interface: String,
    /// The mapping to apply, if any.
    pub mapping: Option<&'a TunnelMapping>,
    /// Further mappings that also claimed this interface.
    pub ambiguous: Vec<&'a TunnelMapping>,
    /// Set when the winning mapping is already bound to an earlier interface.
    pub already_bound_to: Option<String>,
}

/// The full pairing for one discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchPlan<'a> {
    /// One entry per discovered interface, in discovery order.
    pub interfaces: Vec<InterfaceMatch<'a>>,
    /// Mappings that claimed no discovered interface.
    pub inactive: Vec<&'a TunnelMapping>,
}

/// Pair `discovered` interface names with `tunnels`.
pub fn match_tunnels<'a, S: AsRef<str>>(
    discovered: &[S],
    tunnels: &'a IndexMap<String, TunnelMapping>,
) -> MatchPlan<'a> {
    let mut bound: IndexMap<&str, String> = IndexMap::new();
    let mut claimed = vec![false; tunnels.len()];
    let mut interfaces = Vec::with_capacity(discovered.len());

    for name in discovered {
        let name = name.as_ref();
        let mut candidates = tunnels
            .values()
            .enumerate()
            .filter(|(_, mapping)| mapping.matches(name));

        let Some((winner_idx, winner)) = candidates.next() else {
            interfaces.push(InterfaceMatch {
                interface: name.to_owned(),
                mapping: None,
                ambiguous: Vec::new(),
                already_bound_to: None,
            });
            continue;
        };

        let mut ambiguous = Vec::new();
        for (idx, mapping) in candidates {
            if let Some(flag) = claimed.get_mut(idx) {
                *flag = true;
            }
            ambiguous.push(mapping);
        }
        if let Some(flag) = claimed.get_mut(winner_idx) {
            *flag = true;
        }

        let already_bound_to = bound.get(winner.tunnel_name.as_str()).cloned();
        if already_bound_to.is_none() {
            bound.insert(winner.tunnel_name.as_str(), name.to_owned());
        }

        interfaces.push(InterfaceMatch {
            interface: name.to_owned(),
            mapping: Some(winner),
            ambiguous,
            already_bound_to,
        });
    }

    let inactive = tunnels
        .values()
        .zip(&claimed)
        .filter(|(_, claimed)| !**claimed)
        .map(|(mapping, _)| mapping)
        .collect();

    MatchPlan {
        interfaces,
        inactive,
    }
}
