#![allow(clippy::unwrap_used)]
// End-to-end provisioning passes against simulated RouterOS devices.

use pretty_assertions::assert_eq;

use l2tpv6_core::sim::{SimulatedDevice, SimulatedFleet};
use l2tpv6_core::{
    DeviceOutcome, DeviceStatus, Inventory, InventorySources, Ipv6Cidr, ProvisionOptions,
    Provisioner, Source, StepOutcome,
};

// ── Helpers ─────────────────────────────────────────────────────────

const SERVER: &str = "203.0.113.1";
const CAETITE: &str = "10.0.0.2";

fn cidr(s: &str) -> Ipv6Cidr {
    s.parse().unwrap()
}

fn inventory(clients: &str, tunnels: &str, client_maps: &str) -> Inventory {
    Inventory::resolve(&InventorySources {
        servers: Source::new("hosts_server_l2tp.txt", format!("{SERVER},CONCENTRADOR,SSH\n")),
        clients: Source::new("hosts_clients_l2tp.txt", clients),
        tunnels: Source::new("tunnel_mapping.txt", tunnels),
        client_mappings: Source::new("client_ipv6_mapping.txt", client_maps),
    })
    .unwrap()
}

fn caetite_inventory() -> Inventory {
    inventory(
        "10.0.0.2,CAETITE,TELNET\n",
        "caetite,CAETITE,2804:385c:8700::11/126,2804:385c:8700::12,2804:385c:8700::14/126,2804:385c:8700::15\n",
        "CAETITE,bridge,2804:385c:8700::15/126,2804:385c:8700::11\n",
    )
}

fn caetite_server() -> SimulatedDevice {
    SimulatedDevice::new().with_tunnel("l2tp-CAETITE", "caetite", true)
}

fn caetite_client() -> SimulatedDevice {
    SimulatedDevice::new()
        .with_interface("ether1")
        .with_bridge("bridge")
}

fn provisioner(fleet: SimulatedFleet) -> Provisioner<SimulatedFleet> {
    Provisioner::new(fleet, ProvisionOptions::default())
}

fn outcomes(device: &DeviceOutcome) -> Vec<(String, StepOutcome)> {
    device
        .steps
        .iter()
        .map(|s| (s.description.clone(), s.outcome))
        .collect()
}

fn step<'a>(device: &'a DeviceOutcome, prefix: &str) -> &'a l2tpv6_core::StepResult {
    device
        .steps
        .iter()
        .find(|s| s.description.starts_with(prefix))
        .unwrap_or_else(|| panic!("no step starting with {prefix:?} in {:#?}", device.steps))
}

// ── Full pass ───────────────────────────────────────────────────────

#[tokio::test]
async fn caetite_scenario_applies_server_and_client_config() {
    let server = caetite_server();
    let client = caetite_client();
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, server.clone())
        .with_device(CAETITE, client.clone());

    let report = provisioner(fleet).run(&caetite_inventory()).await;

    assert_eq!(
        outcomes(&report.server),
        vec![
            (
                "address 2804:385c:8700::11/126 on l2tp-CAETITE".to_owned(),
                StepOutcome::Applied
            ),
            (
                "route 2804:385c:8700::14/126 via 2804:385c:8700::12".to_owned(),
                StepOutcome::Applied
            ),
        ]
    );
    assert_eq!(
        outcomes(&report.clients[0]),
        vec![
            ("bridge bridge".to_owned(), StepOutcome::AlreadyPresent),
            (
                "address 2804:385c:8700::15/126 on bridge".to_owned(),
                StepOutcome::Applied
            ),
            (
                "route ::/0 via 2804:385c:8700::11".to_owned(),
                StepOutcome::Applied
            ),
        ]
    );
    assert_eq!(report.summary.status, DeviceStatus::Success);
    assert_eq!(report.summary.client_success_rate, Some(100.0));

    let routes = server.routes();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].dst, cidr("2804:385c:8700::14/126"));
    assert_eq!(routes[0].gateway, "2804:385c:8700::12");
    assert_eq!(routes[0].comment.as_deref(), Some("Route-CAETITE"));

    let client_routes = client.routes();
    assert_eq!(client_routes[0].comment.as_deref(), Some("Default-via-L2TP"));
    assert_eq!(client.addresses()[0].interface, "bridge");
}

#[tokio::test]
async fn second_run_is_all_already_present_and_writes_nothing() {
    let server = caetite_server();
    let client = caetite_client();
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, server.clone())
        .with_device(CAETITE, client.clone());
    let provisioner = provisioner(fleet);
    let inventory = caetite_inventory();

    provisioner.run(&inventory).await;
    let writes_after_first = (server.writes().len(), client.writes().len());

    let report = provisioner.run(&inventory).await;
    for device in report.devices() {
        for step in &device.steps {
            assert_eq!(step.outcome, StepOutcome::AlreadyPresent, "{step:?}");
        }
    }
    assert_eq!((server.writes().len(), client.writes().len()), writes_after_first);
    assert_eq!(server.addresses().len(), 1);
    assert_eq!(server.routes().len(), 1);
    assert_eq!(client.addresses().len(), 1);
    assert_eq!(client.routes().len(), 1);
}

#[tokio::test]
async fn every_session_is_closed() {
    let server = caetite_server();
    let client = caetite_client().reject("/ipv6 address add", "failure: ipv6 disabled");
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, server.clone())
        .with_device(CAETITE, client.clone());

    provisioner(fleet).run(&caetite_inventory()).await;

    assert_eq!(server.close_count(), 1);
    assert_eq!(client.close_count(), 1);
}

// ── Failure isolation ───────────────────────────────────────────────

#[tokio::test]
async fn unreachable_client_does_not_affect_its_neighbours() {
    let inventory = inventory(
        "10.0.0.2,ALPHA,SSH\n10.0.0.3,BRAVO,TELNET\n10.0.0.4,CHARLIE,SSH\n",
        "",
        "ALPHA,bridge,2804:385c:8700::15/126,2804:385c:8700::11\n\
         BRAVO,bridge,2804:385c:8700::25/126,2804:385c:8700::21\n\
         CHARLIE,bridge,2804:385c:8700::35/126,2804:385c:8700::31\n",
    );
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, SimulatedDevice::new())
        .with_device("10.0.0.2", caetite_client())
        .with_device("10.0.0.3", caetite_client())
        .with_unreachable("10.0.0.3")
        .with_device("10.0.0.4", caetite_client());

    let provisioner = provisioner(fleet);
    let report = provisioner.run(&inventory).await;

    let statuses: Vec<_> = report
        .clients
        .iter()
        .map(|c| (c.host.label.as_str(), c.status))
        .collect();
    assert_eq!(
        statuses,
        [
            ("ALPHA", DeviceStatus::Success),
            ("BRAVO", DeviceStatus::Failed),
            ("CHARLIE", DeviceStatus::Success),
        ]
    );
    assert!(report.clients[1].connection_error.is_some());
    assert!(report.clients[1].steps.is_empty());
    assert_eq!(report.summary.status, DeviceStatus::Partial);
    assert!(report.has_failures());
}

#[tokio::test]
async fn failed_open_is_attempted_once() {
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_unreachable(CAETITE);
    let provisioner = provisioner(fleet.clone());

    let report = provisioner.run(&caetite_inventory()).await;

    assert_eq!(report.clients[0].status, DeviceStatus::Failed);
    assert_eq!(fleet.open_count(CAETITE), 1);
    assert_eq!(report.summary.client_success_rate, Some(0.0));
}

#[tokio::test]
async fn rejected_command_fails_only_its_step() {
    let server = caetite_server().reject("/ipv6 address add", "failure: ipv6 is disabled");
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, server)
        .with_device(CAETITE, caetite_client());

    let report = provisioner(fleet).run(&caetite_inventory()).await;

    let address = step(&report.server, "address");
    assert_eq!(address.outcome, StepOutcome::Failed);
    assert!(address.detail.as_deref().unwrap().contains("ipv6 is disabled"));
    assert_eq!(step(&report.server, "route").outcome, StepOutcome::Applied);
    assert_eq!(report.server.status, DeviceStatus::Partial);
    assert_eq!(report.clients[0].status, DeviceStatus::Success);
}

#[tokio::test]
async fn dropped_session_fails_the_step_in_flight() {
    let client = caetite_client().disconnect_on("/ipv6 route add");
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_device(CAETITE, client);

    let report = provisioner(fleet).run(&caetite_inventory()).await;

    let route = step(&report.clients[0], "route ::/0");
    assert_eq!(route.outcome, StepOutcome::Failed);
    assert!(route.detail.as_deref().unwrap().contains("closed"));
    assert_eq!(report.clients[0].status, DeviceStatus::Partial);
}

// ── Tunnel matching ─────────────────────────────────────────────────

#[tokio::test]
async fn first_declared_mapping_wins_and_the_other_is_ambiguous() {
    let inventory = inventory(
        "10.0.0.2,CAETITE,SSH\n10.0.0.3,CAETITE2,SSH\n",
        "caetite,CAETITE,2804:385c:8700::11/126,2804:385c:8700::12,2804:385c:8700::14/126,2804:385c:8700::15\n\
         l2tp-caet,CAETITE2,2804:385c:8700::21/126,2804:385c:8700::22,2804:385c:8700::24/126,2804:385c:8700::25\n",
        "CAETITE,bridge,2804:385c:8700::15/126,2804:385c:8700::11\n\
         CAETITE2,bridge,2804:385c:8700::25/126,2804:385c:8700::21\n",
    );
    let server = SimulatedDevice::new().with_tunnel("l2tp-caetite", "caetite", true);
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, server.clone())
        .with_device("10.0.0.2", caetite_client())
        .with_device("10.0.0.3", caetite_client());

    let report = provisioner(fleet).run(&inventory).await;

    assert_eq!(
        step(&report.server, "address").description,
        "address 2804:385c:8700::11/126 on l2tp-caetite"
    );
    assert_eq!(step(&report.server, "address").outcome, StepOutcome::Applied);
    assert_eq!(step(&report.server, "route").outcome, StepOutcome::Applied);

    let loser = step(&report.server, "tunnel l2tp-caetite -> mapping 'l2tp-caet'");
    assert_eq!(loser.outcome, StepOutcome::Failed);
    assert!(loser.detail.as_deref().unwrap().starts_with("ambiguous mapping"));

    assert_eq!(server.addresses().len(), 1);
    assert_eq!(report.server.status, DeviceStatus::Partial);
}

#[tokio::test]
async fn unmapped_tunnel_is_skipped_without_failing_the_server() {
    let server = caetite_server().with_tunnel("l2tp-brumado", "brumado", true);
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, server.clone())
        .with_device(CAETITE, caetite_client());

    let report = provisioner(fleet).run(&caetite_inventory()).await;

    let unmapped = step(&report.server, "tunnel l2tp-brumado");
    assert_eq!(unmapped.outcome, StepOutcome::Skipped);
    assert_eq!(unmapped.detail.as_deref(), Some("no mapping for tunnel"));
    assert_eq!(report.server.failed_steps().count(), 0);
    assert_eq!(report.server.status, DeviceStatus::Success);
    assert!(server.addresses().iter().all(|a| a.interface != "l2tp-brumado"));
}

#[tokio::test]
async fn mapping_without_running_tunnel_is_reported_as_skipped() {
    let server = SimulatedDevice::new().with_tunnel("l2tp-CAETITE", "caetite", false);
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, server.clone())
        .with_device(CAETITE, caetite_client());

    let report = provisioner(fleet).run(&caetite_inventory()).await;

    assert_eq!(
        outcomes(&report.server),
        vec![("mapping 'caetite'".to_owned(), StepOutcome::Skipped)]
    );
    assert_eq!(report.server.status, DeviceStatus::Success);
    assert!(server.writes().is_empty());
}

#[tokio::test]
async fn discover_tunnels_lists_running_sessions_read_only() {
    let server = caetite_server().with_tunnel("l2tp-guanambi", "guanambi", false);
    let fleet = SimulatedFleet::new().with_device(SERVER, server.clone());
    let inventory = caetite_inventory();

    let tunnels = provisioner(fleet)
        .discover_tunnels(inventory.server())
        .await
        .unwrap();

    let names: Vec<_> = tunnels.iter().map(|t| t.interface.as_str()).collect();
    assert_eq!(names, ["l2tp-CAETITE"]);
    assert!(server.writes().is_empty());
}

// ── Client specifics ────────────────────────────────────────────────

#[tokio::test]
async fn conflicting_default_route_is_left_untouched() {
    let client = caetite_client().with_route(cidr("::/0"), "2804:385c:8700::99");
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_device(CAETITE, client.clone());

    let report = provisioner(fleet).run(&caetite_inventory()).await;

    let route = step(&report.clients[0], "route ::/0");
    assert_eq!(route.outcome, StepOutcome::Failed);
    assert!(route.detail.as_deref().unwrap().contains("conflict"));

    let routes = client.routes();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].gateway, "2804:385c:8700::99");
    assert!(client.writes().iter().all(|w| !w.contains("/ipv6 route add")));
}

#[tokio::test]
async fn dynamic_default_route_does_not_count_as_conflict() {
    let client = caetite_client().with_dynamic_route(cidr("::/0"), "fe80::1%ether1");
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_device(CAETITE, client);

    let report = provisioner(fleet).run(&caetite_inventory()).await;

    assert_eq!(step(&report.clients[0], "route ::/0").outcome, StepOutcome::Applied);
}

#[tokio::test]
async fn missing_bridge_lists_present_bridges_and_skips_the_address() {
    let client = SimulatedDevice::new()
        .with_bridge("bridge-lan")
        .with_bridge("bridge-mgmt");
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_device(CAETITE, client);

    let report = provisioner(fleet).run(&caetite_inventory()).await;
    let device = &report.clients[0];

    let bridge = step(device, "bridge");
    assert_eq!(bridge.outcome, StepOutcome::Failed);
    assert_eq!(
        bridge.detail.as_deref(),
        Some("interface bridge not found; bridges present: bridge-lan, bridge-mgmt")
    );
    assert_eq!(step(device, "address").outcome, StepOutcome::Skipped);
    assert_eq!(step(device, "route ::/0").outcome, StepOutcome::Applied);
    assert_eq!(device.status, DeviceStatus::Partial);
}

#[tokio::test]
async fn missing_bridge_is_created_when_allowed() {
    let client = SimulatedDevice::new().with_interface("ether1");
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_device(CAETITE, client.clone());
    let options = ProvisionOptions {
        create_missing_bridge: true,
        ..ProvisionOptions::default()
    };

    let report = Provisioner::new(fleet, options).run(&caetite_inventory()).await;

    assert_eq!(step(&report.clients[0], "bridge").outcome, StepOutcome::Applied);
    assert_eq!(step(&report.clients[0], "address").outcome, StepOutcome::Applied);
    assert_eq!(client.bridges(), ["bridge"]);
}

// ── Verification and device-side idempotence ────────────────────────

#[tokio::test]
async fn write_that_does_not_stick_fails_verification() {
    let client = caetite_client().swallow("/ipv6 address add");
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_device(CAETITE, client);

    let report = provisioner(fleet).run(&caetite_inventory()).await;

    let address = step(&report.clients[0], "address");
    assert_eq!(address.outcome, StepOutcome::Failed);
    assert_eq!(address.detail.as_deref(), Some("not visible after apply"));
}

#[tokio::test]
async fn device_duplicate_reply_counts_as_already_present() {
    // The read shows nothing, but the device still knows the route.
    let client = caetite_client()
        .with_route(cidr("::/0"), "2804:385c:8700::11")
        .reject("/ipv6 route print", "");
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_device(CAETITE, client.clone());

    let report = provisioner(fleet).run(&caetite_inventory()).await;

    let route = step(&report.clients[0], "route ::/0");
    assert_eq!(route.outcome, StepOutcome::AlreadyPresent);
    assert_eq!(client.routes().len(), 1);
}

// ── Concurrency and probes ──────────────────────────────────────────

#[tokio::test]
async fn concurrent_client_pass_reports_in_file_order() {
    let labels = ["A", "B", "C", "D", "E"];
    let clients: String = labels
        .iter()
        .enumerate()
        .map(|(i, l)| format!("10.0.1.{i},{l},SSH\n"))
        .collect();
    let maps: String = labels
        .iter()
        .enumerate()
        .map(|(i, l)| format!("{l},bridge,2804:385c:8700:{i}::15/126,2804:385c:8700::11\n"))
        .collect();
    let inventory = inventory(&clients, "", &maps);

    let mut fleet = SimulatedFleet::new().with_device(SERVER, SimulatedDevice::new());
    for i in 0..labels.len() {
        fleet = fleet.with_device(&format!("10.0.1.{i}"), caetite_client());
    }
    let options = ProvisionOptions {
        client_concurrency: 3,
        ..ProvisionOptions::default()
    };

    let report = Provisioner::new(fleet, options).run(&inventory).await;

    let order: Vec<_> = report.clients.iter().map(|c| c.host.label.as_str()).collect();
    assert_eq!(order, labels);
    assert_eq!(report.summary.clients_success, labels.len());
}

#[tokio::test]
async fn gateway_probe_is_attached_but_informational() {
    let gateway = "2804:385c:8700::11".parse().unwrap();
    let client = caetite_client().with_reachable(gateway);
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_device(CAETITE, client.clone());
    let options = ProvisionOptions {
        probe_gateway: true,
        ..ProvisionOptions::default()
    };

    let report = Provisioner::new(fleet, options).run(&caetite_inventory()).await;

    let probe = report.clients[0].probe.as_ref().unwrap();
    let ping = &probe.gateway;
    assert_eq!(ping.target, "2804:385c:8700::11");
    assert_eq!((ping.sent, ping.received, ping.loss_percent), (4, 4, 0));
    assert!(probe.is_reachable());

    // Default external targets are not reachable from this device.
    let targets: Vec<_> = probe.external.iter().map(|p| p.target.as_str()).collect();
    assert_eq!(targets, ["2001:4860:4860::8888", "2001:4860:4860::8844"]);
    assert!(!probe.external_reachable());
    assert!(!probe.all_ok());
    assert_eq!(probe.mtu, None);
    assert!(!client.commands().iter().any(|c| c.contains("do-not-fragment")));

    assert_eq!(report.clients[0].status, DeviceStatus::Success);
}

#[tokio::test]
async fn one_reachable_external_target_is_enough() {
    let gateway = "2804:385c:8700::11".parse().unwrap();
    let google = "2001:4860:4860::8844".parse().unwrap();
    let client = caetite_client().with_reachable(gateway).with_reachable(google);
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_device(CAETITE, client);
    let options = ProvisionOptions {
        probe_gateway: true,
        ..ProvisionOptions::default()
    };

    let report = Provisioner::new(fleet, options).run(&caetite_inventory()).await;

    let probe = report.clients[0].probe.as_ref().unwrap();
    let answered: Vec<_> = probe.external.iter().map(|p| p.is_reachable()).collect();
    assert_eq!(answered, [false, true]);
    assert!(probe.external_reachable());
    assert!(probe.all_ok());
    assert!(report.render_text().contains("connectivity: OK"));
}

#[tokio::test]
async fn mtu_sweep_stops_at_the_path_ceiling() {
    let gateway = "2804:385c:8700::11".parse().unwrap();
    let client = caetite_client().with_reachable(gateway).with_path_mtu(1450);
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_device(CAETITE, client.clone());
    let options = ProvisionOptions {
        probe_gateway: true,
        external_targets: Vec::new(),
        mtu_sweep: true,
        ..ProvisionOptions::default()
    };

    let report = Provisioner::new(fleet, options).run(&caetite_inventory()).await;

    let mtu = report.clients[0].probe.as_ref().unwrap().mtu.clone().unwrap();
    assert_eq!(mtu.largest_ok, Some(1400));
    assert_eq!(mtu.first_failed, Some(1500));
    assert_eq!(mtu.tested, vec![1280, 1300, 1400, 1500]);
    assert!(mtu.is_adequate());

    let sized: Vec<_> = client
        .commands()
        .into_iter()
        .filter(|c| c.contains("do-not-fragment"))
        .collect();
    assert_eq!(sized.len(), 4);
    assert!(report.render_text().contains("path MTU to 2804:385c:8700::11: 1400 bytes (1500 failed)"));
    assert_eq!(report.clients[0].status, DeviceStatus::Success);
}

#[tokio::test]
async fn mtu_below_ipv6_minimum_is_flagged_but_not_failed() {
    let gateway = "2804:385c:8700::11".parse().unwrap();
    let client = caetite_client().with_reachable(gateway).with_path_mtu(1200);
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_device(CAETITE, client);
    let options = ProvisionOptions {
        probe_gateway: true,
        external_targets: Vec::new(),
        mtu_sweep: true,
        ..ProvisionOptions::default()
    };

    let report = Provisioner::new(fleet, options).run(&caetite_inventory()).await;

    let probe = report.clients[0].probe.as_ref().unwrap();
    let mtu = probe.mtu.as_ref().unwrap();
    assert_eq!((mtu.largest_ok, mtu.first_failed), (None, Some(1280)));
    assert!(!probe.all_ok());
    assert_eq!(report.clients[0].status, DeviceStatus::Success);
}

#[tokio::test]
async fn report_serializes_with_both_sections() {
    let fleet = SimulatedFleet::new()
        .with_device(SERVER, caetite_server())
        .with_device(CAETITE, caetite_client());

    let report = provisioner(fleet).run(&caetite_inventory()).await;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["server"]["status"], "SUCCESS");
    assert_eq!(json["clients"][0]["steps"][1]["outcome"], "APPLIED");
    assert_eq!(json["summary"]["client_success_rate"], 100.0);
    assert!(report.render_text().contains("clients"));
}
