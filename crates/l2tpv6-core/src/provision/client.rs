// ── Client pass ──

use l2tpv6_transport::DeviceSession;
use tracing::info;

use super::ProvisionOptions;
use super::steps::{self, OnConflict};
use crate::model::{
    ClientMapping, DEFAULT_ROUTE_COMMENT, GatewayProbe, Ipv6Cidr, StepOutcome, StepResult,
};
use crate::routeros::RouteSpec;

/// Bridge, bridge address, default route. The address depends on the
/// bridge; the default route is independent of both.
pub(crate) async fn configure<S: DeviceSession>(
    session: &mut S,
    mapping: &ClientMapping,
    options: &ProvisionOptions,
) -> Vec<StepResult> {
    let bridge = &mapping.bridge_interface;
    let verify = options.verify_after_apply;

    let bridge_step =
        steps::ensure_bridge(session, bridge, options.create_missing_bridge, verify).await;

    let address_step = if bridge_step.outcome == StepOutcome::Failed {
        StepResult::skipped(
            format!("address {} on {bridge}", mapping.bridge_ipv6_cidr),
            format!("bridge {bridge} unavailable"),
        )
    } else {
        steps::ensure_address(session, &mapping.bridge_ipv6_cidr, bridge, verify).await
    };

    let route = RouteSpec {
        dst: Ipv6Cidr::default_route(),
        gateway: mapping.default_gateway,
        distance: options.route_distance,
        check_gateway: false,
        comment: DEFAULT_ROUTE_COMMENT.to_owned(),
    };
    let route_step = steps::ensure_route(session, &route, OnConflict::Refuse, verify).await;

    vec![bridge_step, address_step, route_step]
}

/// Gateway ping, external targets and the optional MTU sweep.
pub(crate) async fn probe<S: DeviceSession>(
    session: &mut S,
    mapping: &ClientMapping,
    options: &ProvisionOptions,
) -> Option<GatewayProbe> {
    if !options.probe_gateway {
        return None;
    }
    let gateway = mapping.default_gateway;
    let count = options.ping_count;

    let gateway_ping = steps::ping_target(session, gateway, count).await;
    let mut external = Vec::with_capacity(options.external_targets.len());
    for target in &options.external_targets {
        external.push(steps::ping_target(session, *target, count).await);
    }
    let mtu = if options.mtu_sweep {
        Some(steps::probe_mtu(session, gateway, &options.mtu_sizes).await)
    } else {
        None
    };

    let probe = GatewayProbe {
        gateway: gateway_ping,
        external,
        mtu,
    };
    info!(
        client = %mapping.client_label,
        gateway = probe.is_reachable(),
        external = probe.external_reachable(),
        mtu = ?probe.mtu.as_ref().and_then(|m| m.largest_ok),
        "connectivity checked"
    );
    Some(probe)
}
