//! Inventory resolution and idempotent IPv6 provisioning for RouterOS L2TP
//! fleets.
//!
//! - **[`Inventory`]**: four flat files (server hosts, client hosts, tunnel
//!   mappings, client mappings) resolved once into immutable, cross-checked
//!   tables. Any inconsistency is an [`InventoryError`] before a device is
//!   contacted.
//!
//! - **[`Provisioner`]**: runs the server pass (discover running tunnels,
//!   [match](matcher::match_tunnels) them to mappings, add the tunnel address
//!   and client-network route) and then the client pass (bridge, bridge
//!   address, default route) over any [`Connector`](l2tpv6_transport::Connector).
//!   Every step reads state first and writes only what is missing.
//!
//! - **[`RunReport`]**: per-device outcomes, counts and the client success
//!   rate, serializable or rendered as text.
//!
//! - **`sim`** (feature `sim`): an in-memory RouterOS device and fleet for
//!   tests.

pub mod error;
pub mod inventory;
pub mod matcher;
pub mod model;
pub mod provision;
pub mod report;
pub mod routeros;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

// ── Primary re-exports ──────────────────────────────────────────────
pub use error::{CommandError, CoreError, InventoryError};
pub use inventory::{Inventory, InventoryPaths, InventorySources, Source};
pub use model::{
    ClientMapping, DeviceOutcome, DeviceStatus, GatewayProbe, HostEntry, Ipv6Cidr, MtuProbe,
    PingSummary, Role, StepOutcome, StepResult, Transport, TunnelMapping,
};
pub use provision::{ProvisionOptions, Provisioner};
pub use report::{FailureLine, RunReport, RunSummary};
pub use routeros::DiscoveredTunnel;
