// ── Simulated RouterOS devices ──
//
// An in-memory device that understands the handful of commands the
// provisioner sends and answers in RouterOS output format. Clones share
// state, so a test can hand a device to the fleet and inspect it after the
// run.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use l2tpv6_transport::{Connector, DeviceSession, Error, Transport};

use crate::model::{Ipv6Cidr, parse_gateway};
use crate::routeros::tokenize;

/// An L2TP server session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimTunnel {
    pub interface: String,
    pub user: String,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimAddress {
    pub address: Ipv6Cidr,
    pub interface: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimRoute {
    pub dst: Ipv6Cidr,
    pub gateway: String,
    pub distance: u8,
    pub comment: Option<String>,
    pub dynamic: bool,
}

#[derive(Debug, Default)]
struct Inner {
    interfaces: Vec<String>,
    bridges: Vec<String>,
    tunnels: Vec<SimTunnel>,
    addresses: Vec<SimAddress>,
    routes: Vec<SimRoute>,
    reachable: HashSet<Ipv6Addr>,
    /// Largest unfragmented packet the path carries.
    path_mtu: Option<u32>,
    /// Command fragment -> canned reply.
    rejections: Vec<(String, String)>,
    /// Writes matching these fragments are acknowledged but not applied.
    swallowed: Vec<String>,
    /// Commands matching these fragments drop the session.
    disconnects: Vec<String>,
    log: Vec<String>,
    closed: usize,
}

/// One simulated RouterOS device.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    inner: Arc<Mutex<Inner>>,
    transport: Transport,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            transport: Transport::Ssh,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Builders ────────────────────────────────────────────────────

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_interface(self, name: &str) -> Self {
        self.lock().interfaces.push(name.to_owned());
        self
    }

    pub fn with_bridge(self, name: &str) -> Self {
        {
            let mut inner = self.lock();
            inner.interfaces.push(name.to_owned());
            inner.bridges.push(name.to_owned());
        }
        self
    }

    /// A dynamic L2TP server session on interface `interface`.
    pub fn with_tunnel(self, interface: &str, user: &str, running: bool) -> Self {
        {
            let mut inner = self.lock();
            inner.interfaces.push(interface.to_owned());
            inner.tunnels.push(SimTunnel {
                interface: interface.to_owned(),
                user: user.to_owned(),
                running,
            });
        }
        self
    }

    pub fn with_address(self, cidr: Ipv6Cidr, interface: &str) -> Self {
        self.lock().addresses.push(SimAddress {
            address: cidr,
            interface: interface.to_owned(),
        });
        self
    }

    /// A static route.
    pub fn with_route(self, dst: Ipv6Cidr, gateway: &str) -> Self {
        self.push_route(dst, gateway, false);
        self
    }

    /// A dynamic route, e.g. learned from router advertisements.
    pub fn with_dynamic_route(self, dst: Ipv6Cidr, gateway: &str) -> Self {
        self.push_route(dst, gateway, true);
        self
    }

    fn push_route(&self, dst: Ipv6Cidr, gateway: &str, dynamic: bool) {
        self.lock().routes.push(SimRoute {
            dst: dst.network_cidr(),
            gateway: gateway.to_owned(),
            distance: 1,
            comment: None,
            dynamic,
        });
    }

    /// Answer pings to `address`.
    pub fn with_reachable(self, address: Ipv6Addr) -> Self {
        self.lock().reachable.insert(address);
        self
    }

    /// Drop unfragmentable pings larger than `mtu` bytes.
    pub fn with_path_mtu(self, mtu: u32) -> Self {
        self.lock().path_mtu = Some(mtu);
        self
    }

    /// Reply `reply` to any command containing `fragment`.
    pub fn reject(self, fragment: &str, reply: &str) -> Self {
        self.lock()
            .rejections
            .push((fragment.to_owned(), reply.to_owned()));
        self
    }

    /// Accept writes containing `fragment` without applying them.
    pub fn swallow(self, fragment: &str) -> Self {
        self.lock().swallowed.push(fragment.to_owned());
        self
    }

    /// Drop the session on any command containing `fragment`.
    pub fn disconnect_on(self, fragment: &str) -> Self {
        self.lock().disconnects.push(fragment.to_owned());
        self
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn addresses(&self) -> Vec<SimAddress> {
        self.lock().addresses.clone()
    }

    pub fn routes(&self) -> Vec<SimRoute> {
        self.lock().routes.clone()
    }

    pub fn bridges(&self) -> Vec<String> {
        self.lock().bridges.clone()
    }

    /// Every command received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Commands that would change state.
    pub fn writes(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.split_whitespace().any(|w| w == "add"))
            .collect()
    }

    /// How many sessions on this device were closed.
    pub fn close_count(&self) -> usize {
        self.lock().closed
    }
}

impl DeviceSession for SimulatedDevice {
    async fn run(&mut self, command: &str) -> Result<String, Error> {
        let mut inner = self.lock();
        inner.log.push(command.to_owned());
        if inner.disconnects.iter().any(|f| command.contains(f.as_str())) {
            return Err(Error::Closed {
                address: "simulated".into(),
            });
        }
        Ok(inner.execute(command))
    }

    fn transport(&self) -> Transport {
        self.transport
    }

    async fn close(self) {
        self.lock().closed += 1;
    }
}

// ── Command interpreter ─────────────────────────────────────────────

const BAD_COMMAND: &str = "bad command name (line 1 column 1)";

impl Inner {
    fn execute(&mut self, command: &str) -> String {
        if let Some((_, reply)) = self
            .rejections
            .iter()
            .find(|(fragment, _)| command.contains(fragment.as_str()))
        {
            return reply.clone();
        }
        let swallow = self.swallowed.iter().any(|f| command.contains(f.as_str()));

        let tokens = tokenize(command);
        let path: Vec<&str> = tokens
            .iter()
            .filter(|t| !t.contains('='))
            .map(String::as_str)
            .collect();
        let args: HashMap<&str, &str> = tokens
            .iter()
            .filter_map(|t| t.split_once('='))
            .collect();

        match path.as_slice() {
            ["/interface", "l2tp-server", "print", ..] => self.print_tunnels(),
            ["/interface", "bridge", "print", ..] => self.print_bridges(),
            ["/interface", "bridge", "add"] if swallow => String::new(),
            ["/interface", "bridge", "add"] => self.add_bridge(&args),
            ["/interface", "print", ..] => self.print_interfaces(&args),
            ["/ipv6", "address", "print", ..] => self.print_addresses(&args),
            ["/ipv6", "address", "add"] if swallow => String::new(),
            ["/ipv6", "address", "add"] => self.add_address(&args),
            ["/ipv6", "route", "print", ..] => self.print_routes(&args),
            ["/ipv6", "route", "add"] if swallow => String::new(),
            ["/ipv6", "route", "add"] => self.add_route(&args),
            ["/ping"] => self.ping(&args, false),
            ["/ping", "do-not-fragment"] => self.ping(&args, true),
            _ => BAD_COMMAND.to_owned(),
        }
    }

    fn print_tunnels(&self) -> String {
        let mut out = String::from(
            "Flags: X - disabled, D - dynamic, R - running\n #     NAME                 USER           MTU   CLIENT-ADDRESS  UPTIME\n",
        );
        for (i, t) in self.tunnels.iter().enumerate() {
            let flags = if t.running { "DR" } else { "D " };
            let _ = writeln!(
                out,
                "{i:>2}  {flags} <{}>  {}  1450  198.51.100.{}  1h",
                t.interface,
                t.user,
                i + 1
            );
        }
        out
    }

    fn print_bridges(&self) -> String {
        let mut out = String::new();
        for (i, name) in self.bridges.iter().enumerate() {
            let _ = writeln!(out, "{i:>2} R name={name} mtu=auto");
        }
        out
    }

    fn add_bridge(&mut self, args: &HashMap<&str, &str>) -> String {
        let Some(name) = args.get("name") else {
            return "failure: name not specified".into();
        };
        if self.interfaces.iter().any(|i| i == *name) {
            return "failure: already have interface with such name".into();
        }
        self.interfaces.push((*name).to_owned());
        self.bridges.push((*name).to_owned());
        String::new()
    }

    fn print_interfaces(&self, args: &HashMap<&str, &str>) -> String {
        let mut out = String::new();
        for (i, name) in self.interfaces.iter().enumerate() {
            if args.get("name").is_some_and(|n| *n != name.as_str()) {
                continue;
            }
            let kind = if self.bridges.contains(name) { "bridge" } else { "ether" };
            let _ = writeln!(out, "{i:>2} R name={name} type={kind}");
        }
        out
    }

    fn print_addresses(&self, args: &HashMap<&str, &str>) -> String {
        let mut out = String::new();
        for (i, a) in self.addresses.iter().enumerate() {
            if args.get("interface").is_some_and(|n| *n != a.interface) {
                continue;
            }
            let _ = writeln!(
                out,
                "{i:>2}    address={} from-pool=\"\" interface={} advertise=no",
                a.address, a.interface
            );
        }
        out
    }

    fn add_address(&mut self, args: &HashMap<&str, &str>) -> String {
        let Some(Ok(address)) = args.get("address").map(|a| a.parse::<Ipv6Cidr>()) else {
            return "failure: invalid value for argument address".into();
        };
        let interface = args.get("interface").copied().unwrap_or_default();
        if !self.interfaces.iter().any(|i| i == interface) {
            return "input does not match any value of interface".into();
        }
        if self
            .addresses
            .iter()
            .any(|a| a.interface == interface && a.address.same_address(&address))
        {
            return "failure: already have such address".into();
        }
        self.addresses.push(SimAddress {
            address,
            interface: interface.to_owned(),
        });
        String::new()
    }

    fn print_routes(&self, args: &HashMap<&str, &str>) -> String {
        let filter = args
            .get("dst-address")
            .and_then(|d| d.parse::<Ipv6Cidr>().ok());
        let mut out = String::new();
        for (i, r) in self.routes.iter().enumerate() {
            if filter.is_some_and(|f| !f.same_network(&r.dst)) {
                continue;
            }
            let flags = if r.dynamic { "DAr" } else { "A S" };
            let _ = write!(
                out,
                "{i:>2} {flags} dst-address={} gateway={} distance={}",
                r.dst, r.gateway, r.distance
            );
            if let Some(comment) = &r.comment {
                let _ = write!(out, " comment=\"{comment}\"");
            }
            out.push('\n');
        }
        out
    }

    fn add_route(&mut self, args: &HashMap<&str, &str>) -> String {
        let Some(Ok(dst)) = args.get("dst-address").map(|d| d.parse::<Ipv6Cidr>()) else {
            return "failure: invalid value for argument dst-address".into();
        };
        let Some(gateway) = args.get("gateway") else {
            return "failure: gateway not specified".into();
        };
        let wanted = parse_gateway(gateway);
        if self
            .routes
            .iter()
            .any(|r| r.dst.same_network(&dst) && parse_gateway(&r.gateway) == wanted)
        {
            return "failure: already have such route".into();
        }
        self.routes.push(SimRoute {
            dst: dst.network_cidr(),
            gateway: (*gateway).to_owned(),
            distance: args
                .get("distance")
                .and_then(|d| d.parse().ok())
                .unwrap_or(1),
            comment: args.get("comment").map(|c| (*c).to_owned()),
            dynamic: false,
        });
        String::new()
    }

    fn ping(&self, args: &HashMap<&str, &str>, do_not_fragment: bool) -> String {
        let count: u32 = args.get("count").and_then(|c| c.parse().ok()).unwrap_or(4);
        let size: u32 = args.get("size").and_then(|c| c.parse().ok()).unwrap_or(56);
        let target = args.get("address").copied().unwrap_or_default();
        let reachable = target
            .parse::<Ipv6Addr>()
            .is_ok_and(|a| self.reachable.contains(&a));
        let too_large = do_not_fragment && self.path_mtu.is_some_and(|mtu| size > mtu);

        if too_large {
            format!(
                "  SEQ HOST SIZE TTL TIME STATUS\n    0 {target} {size} packet too large and cannot be fragmented\n    sent={count} received=0 packet-loss=100%\n"
            )
        } else if reachable {
            format!(
                "  SEQ HOST SIZE TTL TIME STATUS\n    sent={count} received={count} packet-loss=0% min-rtt=1ms avg-rtt=1ms max-rtt=2ms\n"
            )
        } else {
            format!("  SEQ HOST SIZE TTL TIME STATUS\n    sent={count} received=0 packet-loss=100%\n")
        }
    }
}

// ── Fleet ───────────────────────────────────────────────────────────

/// A [`Connector`] over simulated devices keyed by address.
#[derive(Debug, Clone, Default)]
pub struct SimulatedFleet {
    devices: HashMap<String, SimulatedDevice>,
    unreachable: HashSet<String>,
    opens: Arc<Mutex<Vec<String>>>,
}

impl SimulatedFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, address: &str, device: SimulatedDevice) -> Self {
        self.devices.insert(address.to_owned(), device);
        self
    }

    /// Refuse every connection to `address`.
    pub fn with_unreachable(mut self, address: &str) -> Self {
        self.unreachable.insert(address.to_owned());
        self
    }

    pub fn device(&self, address: &str) -> Option<&SimulatedDevice> {
        self.devices.get(address)
    }

    /// Number of open attempts made against `address`.
    pub fn open_count(&self, address: &str) -> usize {
        self.opens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| *a == address)
            .count()
    }
}

impl Connector for SimulatedFleet {
    type Session = SimulatedDevice;

    async fn open(&self, address: &str, transport: Transport) -> Result<SimulatedDevice, Error> {
        self.opens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(address.to_owned());

        match self.devices.get(address) {
            Some(device) if !self.unreachable.contains(address) => {
                Ok(device.clone().with_transport(transport))
            }
            _ => Err(Error::Connect {
                address: address.to_owned(),
                transport,
                reason: "connection refused".into(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::routeros;

    fn cidr(s: &str) -> Ipv6Cidr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn answers_in_routeros_format() {
        let mut device = SimulatedDevice::new()
            .with_bridge("bridge")
            .with_address(cidr("2804::15/126"), "bridge");

        let out = device.run(&routeros::print_addresses("bridge")).await.unwrap();
        assert_eq!(routeros::parse_addresses(&out), vec![(cidr("2804::15/126"), "bridge".to_owned())]);

        let out = device.run("/system reboot").await.unwrap();
        assert!(routeros::check_read("/system reboot", &out).is_err());
    }

    #[tokio::test]
    async fn refuses_duplicate_writes_like_routeros() {
        let mut device = SimulatedDevice::new().with_bridge("bridge");
        let add = routeros::add_address(&cidr("2804::15/126"), "bridge");
        assert_eq!(device.run(&add).await.unwrap(), "");
        assert_eq!(
            device.run(&add).await.unwrap(),
            "failure: already have such address"
        );
        assert_eq!(device.addresses().len(), 1);
    }

    #[tokio::test]
    async fn fleet_refuses_unknown_and_unreachable_hosts() {
        let fleet = SimulatedFleet::new()
            .with_device("10.0.0.2", SimulatedDevice::new())
            .with_unreachable("10.0.0.2");
        assert!(fleet.open("10.0.0.2", Transport::Ssh).await.is_err());
        assert!(fleet.open("10.0.0.9", Transport::Telnet).await.is_err());
        assert_eq!(fleet.open_count("10.0.0.2"), 1);
    }
}
