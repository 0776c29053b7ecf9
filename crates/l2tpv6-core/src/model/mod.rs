// ── Domain model ──
//
// Immutable inventory values plus the outcome records a run produces.

pub mod cidr;
pub mod host;
pub mod mapping;
pub mod outcome;

pub use cidr::{CidrError, Ipv6Cidr, parse_gateway};
pub use host::{HostEntry, Role, Transport};
pub use mapping::{ClientMapping, DEFAULT_ROUTE_COMMENT, TunnelMapping};
pub use outcome::{
    DeviceOutcome, DeviceStatus, GatewayProbe, IPV6_MIN_MTU, MtuProbe, PingSummary, StepOutcome,
    StepResult,
};
