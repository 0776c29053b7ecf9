// ── Run report ──
//
// Pure aggregation over device outcomes. The report is assembled once, after
// every device pass has finished, and is not modified afterwards.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::model::{DeviceOutcome, DeviceStatus, GatewayProbe, PingSummary, Role, StepOutcome};

/// Counts and rates derived from the outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    /// SUCCESS when every device succeeded, FAILED when none succeeded even
    /// partially, PARTIAL otherwise.
    pub status: DeviceStatus,
    pub server_status: DeviceStatus,
    pub clients_total: usize,
    pub clients_success: usize,
    pub clients_partial: usize,
    pub clients_failed: usize,
    /// SUCCESS clients / total clients, as a percentage. `None` without clients.
    pub client_success_rate: Option<f64>,
}

impl RunSummary {
    fn compute(server: &DeviceOutcome, clients: &[DeviceOutcome]) -> Self {
        let count = |status| clients.iter().filter(|c| c.status == status).count();
        let clients_success = count(DeviceStatus::Success);
        let clients_partial = count(DeviceStatus::Partial);
        let clients_failed = count(DeviceStatus::Failed);

        let all = || std::iter::once(server).chain(clients);
        let status = if all().all(|d| d.status == DeviceStatus::Success) {
            DeviceStatus::Success
        } else if all().any(|d| d.status != DeviceStatus::Failed) {
            DeviceStatus::Partial
        } else {
            DeviceStatus::Failed
        };

        Self {
            status,
            server_status: server.status,
            clients_total: clients.len(),
            clients_success,
            clients_partial,
            clients_failed,
            client_success_rate: percentage(clients_success, clients.len()),
        }
    }
}

fn percentage(part: usize, total: usize) -> Option<f64> {
    let part = u32::try_from(part).ok()?;
    let total = u32::try_from(total).ok().filter(|t| *t > 0)?;
    Some(f64::from(part) * 100.0 / f64::from(total))
}

/// One failed step or unreachable device, for the failure listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureLine {
    pub device: String,
    pub role: Role,
    pub step: String,
    pub reason: String,
}

/// The consolidated result of one provisioning run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub server: DeviceOutcome,
    pub clients: Vec<DeviceOutcome>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>, server: DeviceOutcome, clients: Vec<DeviceOutcome>) -> Self {
        let summary = RunSummary::compute(&server, &clients);
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            server,
            clients,
            summary,
        }
    }

    /// Every device, server first.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceOutcome> {
        std::iter::once(&self.server).chain(&self.clients)
    }

    /// True when any device ended FAILED or PARTIAL.
    pub fn has_failures(&self) -> bool {
        self.summary.status != DeviceStatus::Success
    }

    pub fn failures(&self) -> Vec<FailureLine> {
        let mut lines = Vec::new();
        for device in self.devices() {
            if let Some(error) = &device.connection_error {
                lines.push(FailureLine {
                    device: device.host.label.clone(),
                    role: device.role,
                    step: "connect".into(),
                    reason: error.clone(),
                });
            }
            for step in device.failed_steps() {
                lines.push(FailureLine {
                    device: device.host.label.clone(),
                    role: device.role,
                    step: step.description.clone(),
                    reason: step.detail.clone().unwrap_or_default(),
                });
            }
        }
        lines
    }

    /// Plain-text report with server, clients, failures and summary sections.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let elapsed = (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default();
        let elapsed = std::time::Duration::from_secs(elapsed.as_secs());

        let _ = writeln!(out, "L2TP IPv6 provisioning report");
        let _ = writeln!(out, "=============================");
        let _ = writeln!(
            out,
            "run {} started {} ({})",
            self.run_id,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            humantime::format_duration(elapsed)
        );

        section(&mut out, "server");
        render_device(&mut out, &self.server);

        section(&mut out, "clients");
        if self.clients.is_empty() {
            let _ = writeln!(out, "  (no clients)");
        }
        for client in &self.clients {
            render_device(&mut out, client);
        }

        let failures = self.failures();
        if !failures.is_empty() {
            section(&mut out, "failures");
            for f in &failures {
                let _ = writeln!(out, "  {} / {}: {}", f.device, f.step, f.reason);
            }
        }

        let s = &self.summary;
        section(&mut out, "summary");
        let _ = writeln!(out, "  server:  {}", s.server_status);
        let _ = writeln!(
            out,
            "  clients: {}/{} successful ({} partial, {} failed)",
            s.clients_success, s.clients_total, s.clients_partial, s.clients_failed
        );
        match s.client_success_rate {
            Some(rate) => {
                let _ = writeln!(out, "  client success rate: {rate:.1}%");
            }
            None => {
                let _ = writeln!(out, "  client success rate: n/a");
            }
        }
        let _ = writeln!(out, "  overall: {}", s.status);
        out
    }
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out, "\n{title}\n{}", "-".repeat(title.len()));
}

fn render_device(out: &mut String, device: &DeviceOutcome) {
    let via = device
        .transport
        .map(|t| format!(" via {t}"))
        .unwrap_or_default();
    let _ = writeln!(out, "  {}  {}{via}", device.host, device.status);

    if let Some(error) = &device.connection_error {
        let _ = writeln!(out, "    connection failed: {error}");
    }
    for step in &device.steps {
        let marker = match step.outcome {
            StepOutcome::Applied => "+",
            StepOutcome::AlreadyPresent => "=",
            StepOutcome::Failed => "!",
            StepOutcome::Skipped => "-",
        };
        let _ = write!(out, "    {marker} {:<16} {}", step.outcome.to_string(), step.description);
        if let Some(detail) = &step.detail {
            let _ = write!(out, " ({detail})");
        }
        out.push('\n');
    }
    if let Some(probe) = &device.probe {
        render_probe(out, probe);
    }
}

fn render_ping(out: &mut String, label: &str, ping: &PingSummary) {
    if let Some(error) = &ping.error {
        let _ = writeln!(out, "    {label} {}: {error}", ping.target);
        return;
    }
    let avg = ping
        .avg_rtt_ms
        .map(|ms| format!(", avg {ms:.1} ms"))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "    {label} {}: {}/{} replies, {}% loss{avg}",
        ping.target, ping.received, ping.sent, ping.loss_percent
    );
}

fn render_probe(out: &mut String, probe: &GatewayProbe) {
    render_ping(out, "gateway", &probe.gateway);
    for ping in &probe.external {
        render_ping(out, "external", ping);
    }
    if let Some(mtu) = &probe.mtu {
        let largest = mtu
            .largest_ok
            .map_or_else(|| "none".to_owned(), |size| format!("{size} bytes"));
        let _ = write!(out, "    path MTU to {}: {largest}", probe.gateway.target);
        if let Some(failed) = mtu.first_failed {
            let _ = write!(out, " ({failed} failed)");
        }
        out.push('\n');
    }
    let verdict = if probe.all_ok() { "OK" } else { "PROBLEMS" };
    let _ = writeln!(out, "    connectivity: {verdict}");
}
