// ── Server pass ──
//
// Discover running L2TP sessions, pair them with tunnel mappings, then put
// the server-side address on each tunnel and route the client network
// through it.

use l2tpv6_transport::DeviceSession;
use tracing::{info, warn};

use super::ProvisionOptions;
use super::steps::{self, OnConflict};
use crate::error::CommandError;
use crate::inventory::Inventory;
use crate::matcher::{InterfaceMatch, match_tunnels};
use crate::model::{StepResult, TunnelMapping};
use crate::routeros::{self, DiscoveredTunnel, RouteSpec};

pub(crate) const NO_MAPPING: &str = "no mapping for tunnel";
pub(crate) const NOT_ACTIVE: &str = "tunnel not active on server";

/// Running tunnel interfaces on the server.
pub(crate) async fn discover<S: DeviceSession>(
    session: &mut S,
) -> Result<Vec<DiscoveredTunnel>, CommandError> {
    let output = steps::read(session, routeros::DISCOVER_TUNNELS).await?;
    let tunnels = routeros::parse_l2tp_server(&output);
    info!(count = tunnels.len(), "discovered running tunnels");
    Ok(tunnels)
}

pub(crate) async fn configure<S: DeviceSession>(
    session: &mut S,
    inventory: &Inventory,
    options: &ProvisionOptions,
) -> Vec<StepResult> {
    let discovered = match discover(session).await {
        Ok(tunnels) => tunnels,
        Err(e) => {
            warn!(error = %e, "tunnel discovery failed");
            return vec![StepResult::failed("discover tunnels", e.to_string())];
        }
    };
    let names: Vec<&str> = discovered.iter().map(|t| t.interface.as_str()).collect();
    let plan = match_tunnels(&names, inventory.tunnels());

    let mut results = Vec::new();
    for entry in &plan.interfaces {
        results.extend(configure_interface(session, entry, options).await);
    }
    for mapping in &plan.inactive {
        info!(tunnel = %mapping.tunnel_name, "mapping has no running tunnel");
        results.push(StepResult::skipped(
            format!("mapping '{}'", mapping.tunnel_name),
            NOT_ACTIVE,
        ));
    }
    results
}

async fn configure_interface<S: DeviceSession>(
    session: &mut S,
    entry: &InterfaceMatch<'_>,
    options: &ProvisionOptions,
) -> Vec<StepResult> {
    let iface = entry.interface.as_str();
    let Some(winner) = entry.mapping else {
        info!(interface = iface, "no mapping for tunnel");
        return vec![StepResult::skipped(format!("tunnel {iface}"), NO_MAPPING)];
    };

    let mut results = Vec::new();
    if let Some(previous) = &entry.already_bound_to {
        results.push(StepResult::failed(
            format!("tunnel {iface} -> mapping '{}'", winner.tunnel_name),
            format!(
                "ambiguous mapping: '{}' already applied to {previous}",
                winner.tunnel_name
            ),
        ));
    } else {
        info!(interface = iface, tunnel = %winner.tunnel_name, "configuring tunnel");
        results.extend(apply_mapping(session, iface, winner, options).await);
    }

    for loser in &entry.ambiguous {
        warn!(interface = iface, tunnel = %loser.tunnel_name, winner = %winner.tunnel_name, "ambiguous mapping");
        results.push(StepResult::failed(
            format!("tunnel {iface} -> mapping '{}'", loser.tunnel_name),
            format!(
                "ambiguous mapping: {iface} already matched by '{}'",
                winner.tunnel_name
            ),
        ));
    }
    results
}

async fn apply_mapping<S: DeviceSession>(
    session: &mut S,
    iface: &str,
    mapping: &TunnelMapping,
    options: &ProvisionOptions,
) -> [StepResult; 2] {
    let address = steps::ensure_address(
        session,
        &mapping.server_ipv6_cidr,
        iface,
        options.verify_after_apply,
    )
    .await;

    let route = RouteSpec {
        dst: mapping.client_network_cidr,
        gateway: mapping.server_gateway,
        distance: options.route_distance,
        check_gateway: true,
        comment: mapping.route_comment(),
    };
    let route = steps::ensure_route(
        session,
        &route,
        OnConflict::AddAlongside,
        options.verify_after_apply,
    )
    .await;

    [address, route]
}
