// Session and connector traits
//
// The orchestrator in `l2tpv6-core` is generic over `Connector`, so the same
// configuration code drives real devices and the in-memory simulator.

use std::future::Future;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Error;

/// Wire protocol declared for a host in the inventory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Transport {
    Ssh,
    Telnet,
}

impl Transport {
    /// Default TCP port for this transport.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Ssh => 22,
            Self::Telnet => 23,
        }
    }
}

/// An open command channel to one device.
///
/// Each `run` is a blocking request/response exchange: the future resolves
/// only once the device has produced the complete output of the command.
pub trait DeviceSession: Send {
    /// Execute `command` and return its raw output.
    fn run(&mut self, command: &str) -> impl Future<Output = Result<String, Error>> + Send;

    /// The transport this session runs over.
    fn transport(&self) -> Transport;

    /// Close the channel. Errors while closing are logged, not returned.
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized;
}

/// Opens [`DeviceSession`]s.
pub trait Connector: Send + Sync {
    type Session: DeviceSession;

    /// Open a session to `address` using the host's declared transport.
    ///
    /// Implementations make one bounded attempt per allowed transport and
    /// never retry indefinitely.
    fn open(
        &self,
        address: &str,
        transport: Transport,
    ) -> impl Future<Output = Result<Self::Session, Error>> + Send;
}
