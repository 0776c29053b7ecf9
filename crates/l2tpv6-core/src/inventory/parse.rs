// ── Inventory row parsing ──
//
// Comma-separated rows; `#` starts a comment, blank lines are ignored and
// every field is trimmed. Each parser validates its own columns and reports
// the first bad row with its file name and 1-based line number.

use std::net::Ipv6Addr;

use crate::error::InventoryError;
use crate::model::{ClientMapping, HostEntry, Ipv6Cidr, Transport, TunnelMapping};

/// A non-empty, comment-stripped row.
#[derive(Debug)]
pub(crate) struct Row<'a> {
    pub line: usize,
    pub fields: Vec<&'a str>,
}

pub(crate) fn rows<'a>(
    text: &'a str,
    file: &str,
    expected: usize,
) -> Result<Vec<Row<'a>>, InventoryError> {
    let mut out = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let content = raw.split_once('#').map_or(raw, |(before, _)| before).trim();
        if content.is_empty() {
            continue;
        }

        let fields: Vec<&str> = content.split(',').map(str::trim).collect();
        if fields.len() != expected {
            return Err(InventoryError::Malformed {
                file: file.to_owned(),
                line,
                reason: format!("expected {expected} fields, found {}", fields.len()),
            });
        }
        if let Some(pos) = fields.iter().position(|f| f.is_empty()) {
            return Err(InventoryError::Malformed {
                file: file.to_owned(),
                line,
                reason: format!("field {} is empty", pos + 1),
            });
        }
        out.push(Row { line, fields });
    }
    Ok(out)
}

fn field<'a>(row: &Row<'a>, idx: usize) -> &'a str {
    row.fields.get(idx).copied().unwrap_or_default()
}

fn cidr(file: &str, row: &Row<'_>, idx: usize) -> Result<Ipv6Cidr, InventoryError> {
    let value = field(row, idx);
    value
        .parse()
        .map_err(|e: crate::model::CidrError| InventoryError::InvalidCidr {
            file: file.to_owned(),
            line: row.line,
            value: value.to_owned(),
            reason: e.to_string(),
        })
}

fn gateway(file: &str, row: &Row<'_>, idx: usize) -> Result<Ipv6Addr, InventoryError> {
    let value = field(row, idx);
    value.parse().map_err(|_| InventoryError::InvalidGateway {
        file: file.to_owned(),
        line: row.line,
        value: value.to_owned(),
    })
}

// ── Typed tables ────────────────────────────────────────────────────

/// `address,label,transport`
pub(crate) fn hosts(text: &str, file: &str) -> Result<Vec<HostEntry>, InventoryError> {
    let mut out: Vec<HostEntry> = Vec::new();
    for row in rows(text, file, 3)? {
        let raw_transport = field(&row, 2);
        let transport: Transport =
            raw_transport
                .parse()
                .map_err(|_| InventoryError::UnknownTransport {
                    file: file.to_owned(),
                    line: row.line,
                    value: raw_transport.to_owned(),
                })?;
        let host = HostEntry::new(field(&row, 0), field(&row, 1), transport);
        if out.iter().any(|h| h.label == host.label) {
            return Err(InventoryError::DuplicateHost {
                file: file.to_owned(),
                label: host.label,
            });
        }
        out.push(host);
    }
    Ok(out)
}

/// `tunnel_name,client_label,server_ipv6_cidr,server_gateway,client_network_cidr,client_gateway`
pub(crate) fn tunnel_mappings(text: &str, file: &str) -> Result<Vec<TunnelMapping>, InventoryError> {
    rows(text, file, 6)?
        .iter()
        .map(|row| {
            Ok(TunnelMapping {
                tunnel_name: field(row, 0).to_owned(),
                client_label: field(row, 1).to_owned(),
                server_ipv6_cidr: cidr(file, row, 2)?,
                server_gateway: gateway(file, row, 3)?,
                client_network_cidr: cidr(file, row, 4)?,
                client_gateway: gateway(file, row, 5)?,
            })
        })
        .collect()
}

/// `client_label,bridge_interface,bridge_ipv6_cidr,default_gateway`
pub(crate) fn client_mappings(text: &str, file: &str) -> Result<Vec<ClientMapping>, InventoryError> {
    rows(text, file, 4)?
        .iter()
        .map(|row| {
            Ok(ClientMapping {
                client_label: field(row, 0).to_owned(),
                bridge_interface: field(row, 1).to_owned(),
                bridge_ipv6_cidr: cidr(file, row, 2)?,
                default_gateway: gateway(file, row, 3)?,
            })
        })
        .collect()
}
