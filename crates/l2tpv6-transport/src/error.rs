use thiserror::Error;

use crate::session::Transport;

/// Top-level error type for the `l2tpv6-transport` crate.
///
/// Covers every failure mode of reaching a device and exchanging commands
/// with it. `l2tpv6-core` decides whether an error is device-fatal (open)
/// or step-fatal (run).
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection ──────────────────────────────────────────────────
    /// TCP connect, DNS resolution, or protocol handshake failed.
    #[error("{transport} connection to {address} failed: {reason}")]
    Connect {
        address: String,
        transport: Transport,
        reason: String,
    },

    /// The device rejected the supplied credentials.
    #[error("{transport} authentication rejected by {address}")]
    Authentication { address: String, transport: Transport },

    /// Every transport allowed for the host was tried and failed.
    #[error("could not open a session to {address}: {}", attempts.join("; "))]
    Exhausted {
        address: String,
        attempts: Vec<String>,
    },

    /// A connect or command exceeded its deadline.
    #[error("timed out after {timeout_secs}s while {during}")]
    Timeout { timeout_secs: u64, during: String },

    // ── Session ─────────────────────────────────────────────────────
    /// The session was already closed (or lost after a failed command).
    #[error("session to {address} is closed")]
    Closed { address: String },

    /// SSH protocol error raised by libssh2.
    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    /// Socket-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking worker running an SSH call panicked or was cancelled.
    #[error("SSH worker failed: {0}")]
    Worker(String),
}

impl Error {
    /// Returns `true` if the error happened before a session existed.
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Authentication { .. } | Self::Exhausted { .. }
        )
    }

    /// Returns `true` if the error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
