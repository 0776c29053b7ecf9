// ── RouterOS dialect ──
//
// Every command string the provisioner sends and every parser for what comes
// back. Reads use `print terse`, which prints one record per line as
// `<index> <flags> key=value key="quoted value" ...`.

use std::net::Ipv6Addr;

use crate::error::CommandError;
use crate::model::{Ipv6Cidr, PingSummary, parse_gateway};

// ── Command builders ────────────────────────────────────────────────

pub const DISCOVER_TUNNELS: &str = "/interface l2tp-server print";
pub const LIST_BRIDGES: &str = "/interface bridge print terse";

/// Quote a value if RouterOS would otherwise split or misread it.
fn quote(value: &str) -> String {
    if value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | ';' | '$' | '[' | ']' | '\\'))
    {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_owned()
    }
}

pub fn print_addresses(interface: &str) -> String {
    format!("/ipv6 address print terse where interface={}", quote(interface))
}

pub fn add_address(cidr: &Ipv6Cidr, interface: &str) -> String {
    format!(
        "/ipv6 address add address={cidr} interface={} advertise=no",
        quote(interface)
    )
}

pub fn print_routes(dst: &Ipv6Cidr) -> String {
    format!("/ipv6 route print terse where dst-address={}", dst.network_cidr())
}

/// Route definition as sent to `/ipv6 route add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub dst: Ipv6Cidr,
    pub gateway: Ipv6Addr,
    pub distance: u8,
    pub check_gateway: bool,
    pub comment: String,
}

pub fn add_route(route: &RouteSpec) -> String {
    let mut cmd = format!(
        "/ipv6 route add dst-address={} gateway={} distance={}",
        route.dst.network_cidr(),
        route.gateway,
        route.distance
    );
    if route.check_gateway {
        cmd.push_str(" check-gateway=ping");
    }
    cmd.push_str(" comment=\"");
    cmd.push_str(&route.comment.replace('"', "'"));
    cmd.push('"');
    cmd
}

pub fn print_interface(name: &str) -> String {
    format!("/interface print terse where name={}", quote(name))
}

pub fn add_bridge(name: &str) -> String {
    format!("/interface bridge add name={}", quote(name))
}

pub fn ping(address: &Ipv6Addr, count: u32) -> String {
    format!("/ping address={address} count={count}")
}

/// One unfragmentable ping of `size` bytes, for path MTU discovery.
pub fn ping_sized(address: &Ipv6Addr, size: u32) -> String {
    format!("/ping address={address} count=1 size={size} do-not-fragment")
}

// ── Reply classification ────────────────────────────────────────────

const ERROR_MARKERS: &[&str] = &[
    "failure:",
    "syntax error",
    "bad command name",
    "expected end of command",
    "input does not match",
    "no such item",
    "invalid value",
];

const DUPLICATE_MARKERS: &[&str] = &[
    "already have such address",
    "already have such route",
    "already have interface with such name",
    "already have such entry",
];

/// How the device answered a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteReply {
    Accepted,
    /// The device refused because the object already exists.
    Duplicate,
}

fn error_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| {
        let lower = line.to_lowercase();
        ERROR_MARKERS.iter().any(|m| lower.contains(m))
    })
}

/// Fail if a read command produced an error message instead of records.
pub fn check_read(command: &str, output: &str) -> Result<(), CommandError> {
    match error_line(output) {
        Some(line) => Err(rejected(command, line)),
        None => Ok(()),
    }
}

/// Classify the reply to a write command.
pub fn classify_write(command: &str, output: &str) -> Result<WriteReply, CommandError> {
    let lower = output.to_lowercase();
    if DUPLICATE_MARKERS.iter().any(|m| lower.contains(m)) {
        return Ok(WriteReply::Duplicate);
    }
    match error_line(output) {
        Some(line) => Err(rejected(command, line)),
        None => Ok(WriteReply::Accepted),
    }
}

fn rejected(command: &str, message: &str) -> CommandError {
    CommandError::Rejected {
        command: command.to_owned(),
        message: message.to_owned(),
    }
}

// ── Terse records ───────────────────────────────────────────────────

/// One `print terse` line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// Single-letter status flags (`D` dynamic, `R` running, `X` disabled...).
    pub flags: String,
    pub fields: Vec<(String, String)>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_flag(&self, flag: char) -> bool {
        self.flags.contains(flag)
    }
}

/// Split a line on whitespace, keeping `"quoted strings"` together and
/// unescaping them.
pub(crate) fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

pub fn parse_terse(output: &str) -> Vec<Record> {
    output
        .lines()
        .filter_map(|line| {
            let mut record = Record::default();
            for token in tokenize(line) {
                match token.split_once('=') {
                    Some((key, value)) => record.fields.push((key.to_owned(), value.to_owned())),
                    None if record.fields.is_empty()
                        && token.chars().all(|c| c.is_ascii_alphabetic()) =>
                    {
                        record.flags.push_str(&token);
                    }
                    None => {}
                }
            }
            (!record.fields.is_empty()).then_some(record)
        })
        .collect()
}

/// Addresses from `/ipv6 address print terse`.
pub fn parse_addresses(output: &str) -> Vec<(Ipv6Cidr, String)> {
    parse_terse(output)
        .into_iter()
        .filter_map(|r| {
            let cidr = r.get("address")?.parse().ok()?;
            Some((cidr, r.get("interface").unwrap_or_default().to_owned()))
        })
        .collect()
}

/// A route from `/ipv6 route print terse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub dst: Ipv6Cidr,
    /// `None` when the gateway is an interface name rather than an address.
    pub gateway: Option<Ipv6Addr>,
    pub raw_gateway: String,
    pub dynamic: bool,
}

pub fn parse_routes(output: &str) -> Vec<RouteEntry> {
    parse_terse(output)
        .into_iter()
        .filter_map(|r| {
            let dst = r.get("dst-address")?.parse().ok()?;
            let raw_gateway = r.get("gateway").unwrap_or_default().to_owned();
            Some(RouteEntry {
                dst,
                gateway: parse_gateway(&raw_gateway),
                raw_gateway,
                dynamic: r.has_flag('D'),
            })
        })
        .collect()
}

/// `name=` values, e.g. from `/interface print terse` or the bridge list.
pub fn parse_names(output: &str) -> Vec<String> {
    parse_terse(output)
        .into_iter()
        .filter_map(|r| r.get("name").map(ToOwned::to_owned))
        .collect()
}

// ── L2TP server sessions ────────────────────────────────────────────

/// A tunnel interface listed by `/interface l2tp-server print`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTunnel {
    pub interface: String,
    pub user: Option<String>,
    pub running: bool,
}

/// Parse the tabular `l2tp-server print`. Dynamic sessions appear as
/// `<l2tp-NAME>`; only rows flagged running are returned.
pub fn parse_l2tp_server(output: &str) -> Vec<DiscoveredTunnel> {
    let mut tunnels = Vec::new();
    for line in output.lines() {
        let Some(interface) = bracketed_name(line).or_else(|| terse_name(line)) else {
            continue;
        };
        if !interface.to_lowercase().contains("l2tp") {
            continue;
        }

        let tokens = tokenize(line);
        let flags: String = tokens
            .iter()
            .skip_while(|t| t.chars().all(|c| c.is_ascii_digit()))
            .take_while(|t| t.chars().all(|c| c.is_ascii_uppercase()))
            .map(String::as_str)
            .collect();
        let running = flags.contains('R') || line.contains("running=yes");
        if !running {
            continue;
        }

        let user = tokens
            .iter()
            .position(|t| t.contains(interface.as_str()))
            .and_then(|pos| tokens.get(pos + 1))
            .filter(|t| !t.contains('='))
            .cloned()
            .or_else(|| {
                parse_terse(line)
                    .first()
                    .and_then(|r| r.get("user"))
                    .map(ToOwned::to_owned)
            });

        tunnels.push(DiscoveredTunnel {
            interface,
            user,
            running,
        });
    }
    tunnels
}

fn bracketed_name(line: &str) -> Option<String> {
    let start = line.find('<')?;
    let end = start + line.get(start..)?.find('>')?;
    line.get(start + 1..end).map(ToOwned::to_owned)
}

fn terse_name(line: &str) -> Option<String> {
    parse_terse(line)
        .first()
        .and_then(|r| r.get("name"))
        .map(|n| n.trim_matches(['<', '>']).to_owned())
}

// ── Ping ────────────────────────────────────────────────────────────

/// Parse the summary line of `/ping`: `sent=4 received=4 packet-loss=0% ... avg-rtt=1ms`.
pub fn parse_ping(target: &str, output: &str) -> Option<PingSummary> {
    let summary = parse_terse(output)
        .into_iter()
        .rev()
        .find(|r| r.get("sent").is_some())?;

    let sent = summary.get("sent")?.parse().ok()?;
    let received = summary.get("received")?.parse().ok()?;
    let loss_percent = summary
        .get("packet-loss")
        .and_then(|v| v.trim_end_matches('%').parse().ok())
        .unwrap_or(if received == 0 { 100 } else { 0 });
    let avg_rtt_ms = summary.get("avg-rtt").and_then(parse_rtt_ms);

    Some(PingSummary {
        target: target.to_owned(),
        sent,
        received,
        loss_percent,
        avg_rtt_ms,
        error: None,
    })
}

/// `1ms`, `12ms345us`, `850us`.
fn parse_rtt_ms(raw: &str) -> Option<f64> {
    let mut total = 0.0;
    let mut digits = String::new();
    let mut unit = String::new();
    let mut parsed_any = false;

    let mut flush = |digits: &mut String, unit: &mut String| -> Option<()> {
        if digits.is_empty() {
            return Some(());
        }
        let value: f64 = digits.parse().ok()?;
        total += match unit.as_str() {
            "ms" => value,
            "us" => value / 1000.0,
            "s" => value * 1000.0,
            _ => return None,
        };
        parsed_any = true;
        digits.clear();
        unit.clear();
        Some(())
    };

    for c in raw.chars() {
        if c.is_ascii_digit() || c == '.' {
            if !unit.is_empty() {
                flush(&mut digits, &mut unit)?;
            }
            digits.push(c);
        } else {
            unit.push(c);
        }
    }
    flush(&mut digits, &mut unit)?;
    parsed_any.then_some(total)
}
