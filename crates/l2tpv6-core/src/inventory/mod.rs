// ── Inventory resolution ──
//
// Four flat files become immutable in-memory tables, cross-checked once at
// load time. Nothing here touches the network.

mod parse;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::error::InventoryError;
use crate::model::{ClientMapping, HostEntry, Ipv6Cidr, TunnelMapping};

/// Default file names inside an inventory directory.
pub const SERVER_HOSTS_FILE: &str = "hosts_server_l2tp.txt";
pub const CLIENT_HOSTS_FILE: &str = "hosts_clients_l2tp.txt";
pub const TUNNEL_MAPPING_FILE: &str = "tunnel_mapping.txt";
pub const CLIENT_MAPPING_FILE: &str = "client_ipv6_mapping.txt";

/// Where the four inventory tables live on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryPaths {
    pub servers: PathBuf,
    pub clients: PathBuf,
    pub tunnels: PathBuf,
    pub client_mappings: PathBuf,
}

impl InventoryPaths {
    /// The default file names under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            servers: dir.join(SERVER_HOSTS_FILE),
            clients: dir.join(CLIENT_HOSTS_FILE),
            tunnels: dir.join(TUNNEL_MAPPING_FILE),
            client_mappings: dir.join(CLIENT_MAPPING_FILE),
        }
    }
}

/// Raw text of one inventory table plus the name used in error messages.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub text: String,
}

impl Source {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    fn read(path: &Path) -> Result<Self, InventoryError> {
        let text = std::fs::read_to_string(path).map_err(|source| InventoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self { name, text })
    }
}

/// The four tables as text, before validation.
#[derive(Debug, Clone)]
pub struct InventorySources {
    pub servers: Source,
    pub clients: Source,
    pub tunnels: Source,
    pub client_mappings: Source,
}

impl InventorySources {
    pub fn read(paths: &InventoryPaths) -> Result<Self, InventoryError> {
        Ok(Self {
            servers: Source::read(&paths.servers)?,
            clients: Source::read(&paths.clients)?,
            tunnels: Source::read(&paths.tunnels)?,
            client_mappings: Source::read(&paths.client_mappings)?,
        })
    }
}

/// Validated, cross-referenced inventory for one run.
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    server: HostEntry,
    clients: Vec<HostEntry>,
    /// Keyed by `tunnel_name` as declared, in file order.
    tunnels: IndexMap<String, TunnelMapping>,
    /// Keyed by `client_label`, in file order.
    client_maps: IndexMap<String, ClientMapping>,
}

impl Inventory {
    /// Read and resolve the files named by `paths`.
    pub fn load(paths: &InventoryPaths) -> Result<Self, InventoryError> {
        Self::resolve(&InventorySources::read(paths)?)
    }

    /// Parse and cross-check the four tables.
    pub fn resolve(sources: &InventorySources) -> Result<Self, InventoryError> {
        let servers = parse::hosts(&sources.servers.text, &sources.servers.name)?;
        let server = match <[HostEntry; 1]>::try_from(servers) {
            Ok([server]) => server,
            Err(servers) => {
                return Err(InventoryError::ServerCount {
                    count: servers.len(),
                });
            }
        };

        let clients = parse::hosts(&sources.clients.text, &sources.clients.name)?;

        let mut client_maps = IndexMap::new();
        for mapping in
            parse::client_mappings(&sources.client_mappings.text, &sources.client_mappings.name)?
        {
            let label = mapping.client_label.clone();
            if client_maps.insert(label.clone(), mapping).is_some() {
                return Err(InventoryError::DuplicateClientMapping { label });
            }
        }

        if let Some(host) = clients.iter().find(|h| !client_maps.contains_key(&h.label)) {
            return Err(InventoryError::MissingClientMapping {
                label: host.label.clone(),
            });
        }
        if let Some(label) = client_maps
            .keys()
            .find(|label| !clients.iter().any(|h| &h.label == *label))
        {
            return Err(InventoryError::OrphanClientMapping {
                label: label.clone(),
            });
        }

        let mut tunnels = IndexMap::new();
        let mut seen = HashSet::new();
        for mapping in parse::tunnel_mappings(&sources.tunnels.text, &sources.tunnels.name)? {
            if !seen.insert(mapping.tunnel_name.to_lowercase()) {
                return Err(InventoryError::DuplicateTunnel {
                    tunnel_name: mapping.tunnel_name,
                });
            }
            if !client_maps.contains_key(&mapping.client_label) {
                return Err(InventoryError::UnknownClientLabel {
                    tunnel_name: mapping.tunnel_name,
                    label: mapping.client_label,
                });
            }
            tunnels.insert(mapping.tunnel_name.clone(), mapping);
        }

        debug!(
            server = %server,
            clients = clients.len(),
            tunnels = tunnels.len(),
            "inventory resolved"
        );

        Ok(Self {
            server,
            clients,
            tunnels,
            client_maps,
        })
    }

    pub fn server(&self) -> &HostEntry {
        &self.server
    }

    /// Client hosts in file order.
    pub fn clients(&self) -> &[HostEntry] {
        &self.clients
    }

    pub fn tunnels(&self) -> &IndexMap<String, TunnelMapping> {
        &self.tunnels
    }

    pub fn client_maps(&self) -> &IndexMap<String, ClientMapping> {
        &self.client_maps
    }

    pub fn client_mapping(&self, label: &str) -> Option<&ClientMapping> {
        self.client_maps.get(label)
    }

    /// The tunnel that carries traffic for `label`, if one is declared.
    pub fn tunnel_for_client(&self, label: &str) -> Option<&TunnelMapping> {
        self.tunnels.values().find(|t| t.client_label == label)
    }

    /// Human-readable warnings for every CIDR or gateway outside `base`.
    pub fn prefix_warnings(&self, base: &Ipv6Cidr) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut check = |what: String, cidr: Ipv6Cidr| {
            if !cidr.is_within(base) {
                warnings.push(format!("{what} {cidr} is outside {base}"));
            }
        };

        for t in self.tunnels.values() {
            check(
                format!("tunnel '{}' server address", t.tunnel_name),
                t.server_ipv6_cidr,
            );
            check(
                format!("tunnel '{}' client network", t.tunnel_name),
                t.client_network_cidr,
            );
        }
        for c in self.client_maps.values() {
            check(
                format!("client '{}' bridge address", c.client_label),
                c.bridge_ipv6_cidr,
            );
        }

        let host_gateways = self
            .tunnels
            .values()
            .map(|t| (format!("tunnel '{}' gateway", t.tunnel_name), t.server_gateway))
            .chain(
                self.client_maps
                    .values()
                    .map(|c| (format!("client '{}' gateway", c.client_label), c.default_gateway)),
            );
        for (what, gw) in host_gateways {
            if let Ok(host) = Ipv6Cidr::new(gw, 128) {
                if !host.is_within(base) {
                    warnings.push(format!("{what} {gw} is outside {base}"));
                }
            }
        }

        warnings
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SERVERS: &str = "# address,label,transport\n203.0.113.1,CONCENTRADOR,SSH\n";
    const CLIENTS: &str = "10.0.0.2,CAETITE,TELNET\n10.0.0.3,GUANAMBI,SSH\n";
    const TUNNELS: &str = "\
caetite,CAETITE,2804:385c:8700::11/126,2804:385c:8700::12,2804:385c:8700::14/126,2804:385c:8700::15
guanambi,GUANAMBI,2804:385c:8700::21/126,2804:385c:8700::22,2804:385c:8700::24/126,2804:385c:8700::25
";
    const CLIENT_MAPS: &str = "\
CAETITE,bridge,2804:385c:8700::15/126,2804:385c:8700::12
GUANAMBI,bridge-lan,2804:385c:8700::25/126,2804:385c:8700::22
";

    fn sources(servers: &str, clients: &str, tunnels: &str, maps: &str) -> InventorySources {
        InventorySources {
            servers: Source::new(SERVER_HOSTS_FILE, servers),
            clients: Source::new(CLIENT_HOSTS_FILE, clients),
            tunnels: Source::new(TUNNEL_MAPPING_FILE, tunnels),
            client_mappings: Source::new(CLIENT_MAPPING_FILE, maps),
        }
    }

    #[test]
    fn resolves_tables_in_file_order() {
        let inv = Inventory::resolve(&sources(SERVERS, CLIENTS, TUNNELS, CLIENT_MAPS)).unwrap();
        assert_eq!(inv.server().label, "CONCENTRADOR");
        let labels: Vec<_> = inv.clients().iter().map(|h| h.label.as_str()).collect();
        assert_eq!(labels, ["CAETITE", "GUANAMBI"]);
        let tunnels: Vec<_> = inv.tunnels().keys().map(String::as_str).collect();
        assert_eq!(tunnels, ["caetite", "guanambi"]);
        assert_eq!(inv.client_mapping("GUANAMBI").unwrap().bridge_interface, "bridge-lan");
        assert_eq!(inv.tunnel_for_client("CAETITE").unwrap().tunnel_name, "caetite");
    }

    #[test]
    fn server_list_must_hold_exactly_one_host() {
        let two = "203.0.113.1,A,SSH\n203.0.113.2,B,SSH\n";
        let err = Inventory::resolve(&sources(two, CLIENTS, TUNNELS, CLIENT_MAPS)).unwrap_err();
        assert!(matches!(err, InventoryError::ServerCount { count: 2 }));

        let err = Inventory::resolve(&sources("# empty\n", CLIENTS, TUNNELS, CLIENT_MAPS)).unwrap_err();
        assert!(matches!(err, InventoryError::ServerCount { count: 0 }));
    }

    #[test]
    fn client_without_mapping_is_rejected() {
        let maps = "CAETITE,bridge,2804:385c:8700::15/126,2804:385c:8700::12\n";
        let err = Inventory::resolve(&sources(SERVERS, CLIENTS, "", maps)).unwrap_err();
        assert!(matches!(err, InventoryError::MissingClientMapping { ref label } if label == "GUANAMBI"));
    }

    #[test]
    fn mapping_without_client_is_rejected() {
        let clients = "10.0.0.2,CAETITE,TELNET\n";
        let err = Inventory::resolve(&sources(SERVERS, clients, "", CLIENT_MAPS)).unwrap_err();
        assert!(matches!(err, InventoryError::OrphanClientMapping { ref label } if label == "GUANAMBI"));
    }

    #[test]
    fn client_without_tunnel_row_is_allowed() {
        let tunnels = TUNNELS.lines().next().unwrap();
        let inv = Inventory::resolve(&sources(SERVERS, CLIENTS, tunnels, CLIENT_MAPS)).unwrap();
        assert_eq!(inv.clients().len(), 2);
        assert!(inv.tunnel_for_client("GUANAMBI").is_none());
        assert!(inv.client_mapping("GUANAMBI").is_some());
    }

    #[test]
    fn tunnel_must_reference_known_client() {
        let tunnels = "bom-jesus,BOMJESUS,2804::1/126,2804::2,2804::4/126,2804::5\n";
        let err = Inventory::resolve(&sources(SERVERS, CLIENTS, tunnels, CLIENT_MAPS)).unwrap_err();
        assert!(matches!(err, InventoryError::UnknownClientLabel { ref label, .. } if label == "BOMJESUS"));
    }

    #[test]
    fn tunnel_names_are_unique_ignoring_case() {
        let tunnels = format!("{TUNNELS}CAETITE,CAETITE,2804::1/126,2804::2,2804::4/126,2804::5\n");
        let err = Inventory::resolve(&sources(SERVERS, CLIENTS, &tunnels, CLIENT_MAPS)).unwrap_err();
        assert!(matches!(err, InventoryError::DuplicateTunnel { ref tunnel_name } if tunnel_name == "CAETITE"));
    }

    #[test]
    fn prefix_warnings_flag_foreign_blocks() {
        let maps = "\
CAETITE,bridge,2001:db8::15/126,2804:385c:8700::12
GUANAMBI,bridge-lan,2804:385c:8700::25/126,2804:385c:8700::22
";
        let inv = Inventory::resolve(&sources(SERVERS, CLIENTS, TUNNELS, maps)).unwrap();
        let warnings = inv.prefix_warnings(&"2804:385c:8700::/48".parse().unwrap());
        assert_eq!(
            warnings,
            vec!["client 'CAETITE' bridge address 2001:db8::15/126 is outside 2804:385c:8700::/48".to_owned()]
        );
    }

    #[test]
    fn load_reports_missing_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Inventory::load(&InventoryPaths::in_dir(dir.path())).unwrap_err();
        assert!(matches!(err, InventoryError::Io { ref path, .. } if path.ends_with(SERVER_HOSTS_FILE)));
    }
}
