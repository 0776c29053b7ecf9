// ── Idempotent steps ──
//
// Each step reads the current device state, compares it with the desired
// value after normalization, and only writes when something is missing.
// A step never returns an error: command failures become FAILED results so
// later independent steps still run.

use std::net::Ipv6Addr;

use l2tpv6_transport::DeviceSession;
use tracing::{debug, info, warn};

use crate::error::CommandError;
use crate::model::{Ipv6Cidr, MtuProbe, PingSummary, StepResult};
use crate::routeros::{self, RouteSpec, WriteReply};

/// What to do when the destination already routes via another gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnConflict {
    /// Add the route next to the existing ones.
    AddAlongside,
    /// Leave the device alone and fail the step.
    Refuse,
}

async fn exec<S: DeviceSession>(session: &mut S, command: &str) -> Result<String, CommandError> {
    debug!(command, "exec");
    Ok(session.run(command).await?)
}

pub(crate) async fn read<S: DeviceSession>(
    session: &mut S,
    command: &str,
) -> Result<String, CommandError> {
    let output = exec(session, command).await?;
    routeros::check_read(command, &output)?;
    Ok(output)
}

async fn write<S: DeviceSession>(
    session: &mut S,
    command: &str,
) -> Result<WriteReply, CommandError> {
    let output = exec(session, command).await?;
    routeros::classify_write(command, &output)
}

fn finish(description: String, result: Result<StepResult, CommandError>) -> StepResult {
    match result {
        Ok(step) => {
            info!(step = %step.description, outcome = %step.outcome, "step finished");
            step
        }
        Err(e) => {
            warn!(step = %description, error = %e, "step failed");
            StepResult::failed(description, e.to_string())
        }
    }
}

// ── Interface address ───────────────────────────────────────────────

async fn address_present<S: DeviceSession>(
    session: &mut S,
    cidr: &Ipv6Cidr,
    interface: &str,
) -> Result<bool, CommandError> {
    let output = read(session, &routeros::print_addresses(interface)).await?;
    Ok(routeros::parse_addresses(&output)
        .iter()
        .any(|(existing, iface)| {
            existing.same_address(cidr) && (iface.is_empty() || iface == interface)
        }))
}

/// Ensure `cidr` is configured on `interface`.
pub(crate) async fn ensure_address<S: DeviceSession>(
    session: &mut S,
    cidr: &Ipv6Cidr,
    interface: &str,
    verify: bool,
) -> StepResult {
    let description = format!("address {cidr} on {interface}");
    let result = apply_address(session, cidr, interface, verify, &description).await;
    finish(description, result)
}

async fn apply_address<S: DeviceSession>(
    session: &mut S,
    cidr: &Ipv6Cidr,
    interface: &str,
    verify: bool,
    description: &str,
) -> Result<StepResult, CommandError> {
    if address_present(session, cidr, interface).await? {
        return Ok(StepResult::already_present(description));
    }
    if write(session, &routeros::add_address(cidr, interface)).await? == WriteReply::Duplicate {
        return Ok(StepResult::already_present(description)
            .with_detail("device reported the address as existing"));
    }
    if verify && !address_present(session, cidr, interface).await? {
        return Ok(StepResult::failed(description, "not visible after apply"));
    }
    Ok(StepResult::applied(description))
}

// ── Routes ──────────────────────────────────────────────────────────

/// Ensure a route to `route.dst` via `route.gateway` exists.
pub(crate) async fn ensure_route<S: DeviceSession>(
    session: &mut S,
    route: &RouteSpec,
    on_conflict: OnConflict,
    verify: bool,
) -> StepResult {
    let description = format!("route {} via {}", route.dst.network_cidr(), route.gateway);
    let result = apply_route(session, route, on_conflict, verify, &description).await;
    finish(description, result)
}

async fn apply_route<S: DeviceSession>(
    session: &mut S,
    route: &RouteSpec,
    on_conflict: OnConflict,
    verify: bool,
    description: &str,
) -> Result<StepResult, CommandError> {
    let existing = routes_to(session, &route.dst).await?;
    if existing.iter().any(|r| r.gateway == Some(route.gateway)) {
        return Ok(StepResult::already_present(description));
    }
    if on_conflict == OnConflict::Refuse {
        if let Some(other) = existing.iter().find(|r| !r.dynamic) {
            return Ok(StepResult::failed(
                description,
                format!(
                    "conflict: {} already routed via {}; existing route left untouched",
                    route.dst.network_cidr(),
                    other.raw_gateway
                ),
            ));
        }
    }
    if write(session, &routeros::add_route(route)).await? == WriteReply::Duplicate {
        return Ok(StepResult::already_present(description)
            .with_detail("device reported the route as existing"));
    }
    if verify && !route_present(session, &route.dst, route.gateway).await? {
        return Ok(StepResult::failed(description, "not visible after apply"));
    }
    Ok(StepResult::applied(description))
}

async fn routes_to<S: DeviceSession>(
    session: &mut S,
    dst: &Ipv6Cidr,
) -> Result<Vec<routeros::RouteEntry>, CommandError> {
    let output = read(session, &routeros::print_routes(dst)).await?;
    Ok(routeros::parse_routes(&output)
        .into_iter()
        .filter(|r| r.dst.same_network(dst))
        .collect())
}

async fn route_present<S: DeviceSession>(
    session: &mut S,
    dst: &Ipv6Cidr,
    gateway: Ipv6Addr,
) -> Result<bool, CommandError> {
    Ok(routes_to(session, dst)
        .await?
        .iter()
        .any(|r| r.gateway == Some(gateway)))
}

// ── Bridge ──────────────────────────────────────────────────────────

async fn interface_exists<S: DeviceSession>(
    session: &mut S,
    name: &str,
) -> Result<bool, CommandError> {
    let output = read(session, &routeros::print_interface(name)).await?;
    Ok(routeros::parse_names(&output).iter().any(|n| n == name))
}

/// Ensure the bridge interface `name` exists, creating it when allowed.
pub(crate) async fn ensure_bridge<S: DeviceSession>(
    session: &mut S,
    name: &str,
    create: bool,
    verify: bool,
) -> StepResult {
    let description = format!("bridge {name}");
    let result = apply_bridge(session, name, create, verify, &description).await;
    finish(description, result)
}

async fn apply_bridge<S: DeviceSession>(
    session: &mut S,
    name: &str,
    create: bool,
    verify: bool,
    description: &str,
) -> Result<StepResult, CommandError> {
    if interface_exists(session, name).await? {
        return Ok(StepResult::already_present(description));
    }
    if !create {
        let bridges = routeros::parse_names(&read(session, routeros::LIST_BRIDGES).await?);
        let present = if bridges.is_empty() {
            "none".to_owned()
        } else {
            bridges.join(", ")
        };
        return Ok(StepResult::failed(
            description,
            format!("interface {name} not found; bridges present: {present}"),
        ));
    }
    if write(session, &routeros::add_bridge(name)).await? == WriteReply::Duplicate {
        return Ok(StepResult::already_present(description));
    }
    if verify && !interface_exists(session, name).await? {
        return Ok(StepResult::failed(description, "not visible after apply"));
    }
    Ok(StepResult::applied(description).with_detail("created"))
}

// ── Connectivity checks ─────────────────────────────────────────────

/// Ping `target`; informational only.
pub(crate) async fn ping_target<S: DeviceSession>(
    session: &mut S,
    target: Ipv6Addr,
    count: u32,
) -> PingSummary {
    let name = target.to_string();
    match read(session, &routeros::ping(&target, count)).await {
        Ok(output) => routeros::parse_ping(&name, &output).unwrap_or_else(|| {
            warn!(target = %name, "could not parse ping summary");
            PingSummary::failed(name, "no ping summary in output")
        }),
        Err(e) => {
            warn!(target = %name, error = %e, "ping failed");
            PingSummary::failed(name, e.to_string())
        }
    }
}

/// Send single unfragmentable pings of growing size to `target`, stopping
/// at the first size that gets no reply.
pub(crate) async fn probe_mtu<S: DeviceSession>(
    session: &mut S,
    target: Ipv6Addr,
    sizes: &[u32],
) -> MtuProbe {
    let name = target.to_string();
    let mut sizes = sizes.to_vec();
    sizes.sort_unstable();
    sizes.dedup();

    let mut probe = MtuProbe::default();
    for size in sizes {
        probe.tested.push(size);
        let answered = match read(session, &routeros::ping_sized(&target, size)).await {
            Ok(output) => {
                routeros::parse_ping(&name, &output).is_some_and(|p| p.is_reachable())
            }
            Err(e) => {
                warn!(target = %name, size, error = %e, "sized ping failed");
                false
            }
        };
        debug!(target = %name, size, answered, "mtu probe");
        if !answered {
            probe.first_failed = Some(size);
            break;
        }
        probe.largest_ok = Some(size);
    }
    probe
}
