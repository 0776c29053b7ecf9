//! Tunnels command: read-only view of the server's running L2TP sessions.

use serde::Serialize;
use tabled::Tabled;

use l2tpv6_core::matcher::{InterfaceMatch, match_tunnels};
use l2tpv6_core::{Provisioner, TunnelMapping};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct TunnelView {
    interface: Option<String>,
    user: Option<String>,
    mapping: Option<String>,
    client: Option<String>,
    note: String,
}

#[derive(Tabled)]
struct TunnelRow {
    #[tabled(rename = "Interface")]
    interface: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Mapping")]
    mapping: String,
    #[tabled(rename = "Client")]
    client: String,
    #[tabled(rename = "Note")]
    note: String,
}

impl From<&TunnelView> for TunnelRow {
    fn from(v: &TunnelView) -> Self {
        let or_dash = |s: &Option<String>| s.clone().unwrap_or_else(|| "-".into());
        Self {
            interface: or_dash(&v.interface),
            user: or_dash(&v.user),
            mapping: or_dash(&v.mapping),
            client: or_dash(&v.client),
            note: v.note.clone(),
        }
    }
}

fn note(entry: &InterfaceMatch<'_>) -> String {
    match (&entry.mapping, &entry.already_bound_to) {
        (None, _) => "no mapping".into(),
        (Some(_), Some(previous)) => format!("mapping already bound to {previous}"),
        (Some(_), None) if entry.ambiguous.is_empty() => "ok".into(),
        (Some(_), None) => {
            let others: Vec<_> = entry
                .ambiguous
                .iter()
                .map(|m| m.tunnel_name.as_str())
                .collect();
            format!("ambiguous, also matches {}", others.join(", "))
        }
    }
}

fn inactive(mapping: &TunnelMapping) -> TunnelView {
    TunnelView {
        interface: None,
        user: None,
        mapping: Some(mapping.tunnel_name.clone()),
        client: Some(mapping.client_label.clone()),
        note: "not active on server".into(),
    }
}

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let inventory = config::load_inventory(global, &cfg)?;
    let connector = config::connector(global, &cfg)?;

    let provisioner = Provisioner::new(connector, cfg.provision.clone());
    let discovered = provisioner.discover_tunnels(inventory.server()).await?;

    let names: Vec<&str> = discovered.iter().map(|t| t.interface.as_str()).collect();
    let plan = match_tunnels(&names, inventory.tunnels());

    let mut views: Vec<TunnelView> = plan
        .interfaces
        .iter()
        .zip(&discovered)
        .map(|(entry, tunnel)| TunnelView {
            interface: Some(entry.interface.clone()),
            user: tunnel.user.clone(),
            mapping: entry.mapping.map(|m| m.tunnel_name.clone()),
            client: entry.mapping.map(|m| m.client_label.clone()),
            note: note(entry),
        })
        .collect();
    views.extend(plan.inactive.iter().map(|m| inactive(m)));

    let out = output::render_list(
        &global.output,
        &views,
        |v| TunnelRow::from(v),
        |v| v.interface.clone().unwrap_or_default(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
