//! Command sessions for RouterOS devices over SSH and Telnet.
//!
//! This crate is the lowest layer of the l2tpv6 workspace. It knows how to
//! reach a device and exchange line-oriented commands with it, and nothing
//! about what those commands mean:
//!
//! - **[`DeviceSession`]**: an open command channel. [`run`](DeviceSession::run)
//!   sends one command and returns its raw textual output.
//! - **[`Connector`]**: opens sessions. [`RouterOsConnector`] is the real
//!   implementation; `l2tpv6-core` ships an in-memory one for tests.
//! - **[`SshSession`]** / **[`TelnetSession`]**: the two wire transports,
//!   selected per host by [`Transport`].
//!
//! Opening is a single bounded attempt: the connect timeout applies once per
//! transport tried, and there is no retry loop.

pub mod connector;
pub mod error;
pub mod session;
pub mod ssh;
pub mod telnet;

pub use connector::{AnySession, RouterOsConnector, SessionConfig};
pub use error::Error;
pub use session::{Connector, DeviceSession, Transport};
pub use ssh::SshSession;
pub use telnet::TelnetSession;
