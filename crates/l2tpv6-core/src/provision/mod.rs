// ── Provisioning orchestrator ──
//
// One pass: the server first, then every client in file order. Each device
// gets exactly one session, owned by the task configuring it and closed when
// that task ends. Failures never cross the device boundary.

mod client;
mod server;
mod steps;

use std::net::Ipv6Addr;

use chrono::Utc;
use futures::StreamExt;
use l2tpv6_transport::{Connector, DeviceSession};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CoreError;
use crate::inventory::Inventory;
use crate::model::{DeviceOutcome, DeviceStatus, HostEntry, Role, StepResult};
use crate::report::RunReport;
use crate::routeros::DiscoveredTunnel;

/// Behavior switches for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionOptions {
    /// Clients configured at the same time. `1` is strictly sequential.
    pub client_concurrency: usize,
    /// Create a missing client bridge instead of failing the step.
    pub create_missing_bridge: bool,
    /// Re-read state after every write and fail if it did not stick.
    pub verify_after_apply: bool,
    /// Run connectivity checks on each client after configuring it.
    pub probe_gateway: bool,
    /// Distance set on every route the provisioner adds.
    pub route_distance: u8,
    /// Echo requests per connectivity ping.
    pub ping_count: u32,
    /// Outside addresses each client should reach through the tunnel.
    pub external_targets: Vec<Ipv6Addr>,
    /// Also sweep unfragmentable ping sizes towards the gateway.
    pub mtu_sweep: bool,
    /// Packet sizes tried by the sweep, smallest first.
    pub mtu_sizes: Vec<u32>,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            client_concurrency: 1,
            create_missing_bridge: false,
            verify_after_apply: true,
            probe_gateway: false,
            route_distance: 1,
            ping_count: 4,
            external_targets: vec![
                Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8888),
                Ipv6Addr::new(0x2001, 0x4860, 0x4860, 0, 0, 0, 0, 0x8844),
            ],
            mtu_sweep: false,
            mtu_sizes: vec![1280, 1300, 1400, 1500, 1600, 1700, 1800, 1900, 2000],
        }
    }
}

/// Drives a provisioning pass over any [`Connector`].
#[derive(Debug)]
pub struct Provisioner<C> {
    connector: C,
    options: ProvisionOptions,
}

impl<C: Connector> Provisioner<C> {
    pub fn new(connector: C, options: ProvisionOptions) -> Self {
        Self { connector, options }
    }

    pub fn options(&self) -> &ProvisionOptions {
        &self.options
    }

    /// Run a full pass and build the report.
    pub async fn run(&self, inventory: &Inventory) -> RunReport {
        self.run_observed(inventory, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_device` as each device finishes.
    pub async fn run_observed<F>(&self, inventory: &Inventory, on_device: F) -> RunReport
    where
        F: Fn(&DeviceOutcome),
    {
        let started_at = Utc::now();
        info!(
            server = %inventory.server(),
            clients = inventory.clients().len(),
            concurrency = self.options.client_concurrency,
            "provisioning run started"
        );

        let server = self.provision_server(inventory).await;
        on_device(&server);

        let clients: Vec<DeviceOutcome> = futures::stream::iter(inventory.clients())
            .map(|host| self.provision_client(host, inventory))
            .buffered(self.options.client_concurrency.max(1))
            .inspect(|outcome| on_device(outcome))
            .collect()
            .await;

        let report = RunReport::new(started_at, server, clients);
        info!(status = %report.summary.status, "provisioning run finished");
        report
    }

    /// Configure the L2TP server.
    pub async fn provision_server(&self, inventory: &Inventory) -> DeviceOutcome {
        let host = inventory.server().clone();
        info!(host = %host, "configuring server");
        let mut session = match self.open(&host).await {
            Ok(session) => session,
            Err(e) => return log_outcome(DeviceOutcome::unreachable(host, Role::Server, e)),
        };

        let transport = session.transport();
        let steps = server::configure(&mut session, inventory, &self.options).await;
        session.close().await;

        log_outcome(DeviceOutcome::completed(host, Role::Server, steps).with_transport(transport))
    }

    /// Configure one client.
    pub async fn provision_client(&self, host: &HostEntry, inventory: &Inventory) -> DeviceOutcome {
        let host = host.clone();
        info!(host = %host, "configuring client");
        let Some(mapping) = inventory.client_mapping(&host.label) else {
            return log_outcome(DeviceOutcome::completed(
                host,
                Role::Client,
                vec![StepResult::failed("client mapping", "no client mapping for this label")],
            ));
        };
        let mut session = match self.open(&host).await {
            Ok(session) => session,
            Err(e) => return log_outcome(DeviceOutcome::unreachable(host, Role::Client, e)),
        };

        let transport = session.transport();
        let steps = client::configure(&mut session, mapping, &self.options).await;
        let probe = client::probe(&mut session, mapping, &self.options).await;
        session.close().await;

        log_outcome(
            DeviceOutcome::completed(host, Role::Client, steps)
                .with_transport(transport)
                .with_probe(probe),
        )
    }

    /// List the server's running tunnels without changing anything.
    pub async fn discover_tunnels(
        &self,
        host: &HostEntry,
    ) -> Result<Vec<DiscoveredTunnel>, CoreError> {
        let mut session = self.connector.open(&host.address, host.transport).await?;
        let result = server::discover(&mut session).await;
        session.close().await;
        Ok(result?)
    }

    async fn open(&self, host: &HostEntry) -> Result<C::Session, String> {
        self.connector
            .open(&host.address, host.transport)
            .await
            .map_err(|e| {
                warn!(host = %host, error = %e, "could not open session");
                e.to_string()
            })
    }
}

fn log_outcome(outcome: DeviceOutcome) -> DeviceOutcome {
    match outcome.status {
        DeviceStatus::Success => {
            info!(host = %outcome.host, role = %outcome.role, "device configured");
        }
        status => {
            warn!(host = %outcome.host, role = %outcome.role, %status, "device not fully configured");
        }
    }
    outcome
}
