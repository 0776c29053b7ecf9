//! Validate command: resolve the inventory without touching any device.

use serde::Serialize;

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct ValidationSummary {
    server: String,
    clients: usize,
    tunnels: usize,
    client_mappings: usize,
    base_prefix: Option<String>,
    warnings: Vec<String>,
}

fn detail(s: &ValidationSummary) -> String {
    let mut lines = vec![
        "Inventory OK".to_owned(),
        format!("Server:          {}", s.server),
        format!("Clients:         {}", s.clients),
        format!("Tunnel mappings: {}", s.tunnels),
        format!("Client mappings: {}", s.client_mappings),
    ];
    if let Some(base) = &s.base_prefix {
        lines.push(format!("Base prefix:     {base}"));
    }
    for w in &s.warnings {
        lines.push(format!("warning: {w}"));
    }
    lines.join("\n")
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let inventory = config::load_inventory(global, &cfg)?;
    let base = cfg.base_prefix()?;

    let summary = ValidationSummary {
        server: inventory.server().to_string(),
        clients: inventory.clients().len(),
        tunnels: inventory.tunnels().len(),
        client_mappings: inventory.client_maps().len(),
        base_prefix: base.map(|b| b.to_string()),
        warnings: base
            .map(|b| inventory.prefix_warnings(&b))
            .unwrap_or_default(),
    };

    let out = output::render_single(&global.output, &summary, detail, |_| "ok".into())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
