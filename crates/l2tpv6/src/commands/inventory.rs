//! Inventory command: the resolved hosts and what each will receive.

use serde::Serialize;
use tabled::Tabled;

use l2tpv6_core::{ClientMapping, HostEntry, Inventory, Role, TunnelMapping};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HostView<'a> {
    role: Role,
    #[serde(flatten)]
    host: &'a HostEntry,
    tunnel: Option<&'a TunnelMapping>,
    client: Option<&'a ClientMapping>,
}

#[derive(Tabled)]
struct HostRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Via")]
    transport: String,
    #[tabled(rename = "Tunnel")]
    tunnel: String,
    #[tabled(rename = "Client Network")]
    network: String,
    #[tabled(rename = "Bridge")]
    bridge: String,
    #[tabled(rename = "Bridge Address")]
    bridge_address: String,
    #[tabled(rename = "Default Gateway")]
    gateway: String,
}

impl From<&HostView<'_>> for HostRow {
    fn from(v: &HostView<'_>) -> Self {
        let dash = || "-".to_owned();
        Self {
            role: v.role.to_string(),
            label: v.host.label.clone(),
            address: v.host.address.clone(),
            transport: v.host.transport.to_string(),
            tunnel: v.tunnel.map_or_else(dash, |t| t.tunnel_name.clone()),
            network: v
                .tunnel
                .map_or_else(dash, |t| t.client_network_cidr.to_string()),
            bridge: v.client.map_or_else(dash, |c| c.bridge_interface.clone()),
            bridge_address: v
                .client
                .map_or_else(dash, |c| c.bridge_ipv6_cidr.to_string()),
            gateway: v.client.map_or_else(dash, |c| c.default_gateway.to_string()),
        }
    }
}

fn views(inventory: &Inventory) -> Vec<HostView<'_>> {
    let server = HostView {
        role: Role::Server,
        host: inventory.server(),
        tunnel: None,
        client: None,
    };
    let clients = inventory.clients().iter().map(|host| HostView {
        role: Role::Client,
        host,
        tunnel: inventory.tunnel_for_client(&host.label),
        client: inventory.client_mapping(&host.label),
    });
    std::iter::once(server).chain(clients).collect()
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let inventory = config::load_inventory(global, &cfg)?;

    let out = output::render_list(
        &global.output,
        &views(&inventory),
        |v| HostRow::from(v),
        |v| v.host.label.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
