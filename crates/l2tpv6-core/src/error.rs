// ── Core error types ──
//
// Three tiers, matching how far a failure is allowed to reach:
// `InventoryError` aborts the run before any device is contacted,
// transport errors fail a single device, `CommandError` fails a single step.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal, load-time problems with the inventory files.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}:{line}: {reason}")]
    Malformed {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("{file}:{line}: unknown transport '{value}' (expected SSH or TELNET)")]
    UnknownTransport {
        file: String,
        line: usize,
        value: String,
    },

    #[error("{file}:{line}: invalid IPv6 CIDR '{value}': {reason}")]
    InvalidCidr {
        file: String,
        line: usize,
        value: String,
        reason: String,
    },

    #[error("{file}:{line}: invalid IPv6 gateway '{value}'")]
    InvalidGateway {
        file: String,
        line: usize,
        value: String,
    },

    // ── Cross-table consistency ──────────────────────────────────────
    #[error("{file}: host '{label}' is declared more than once")]
    DuplicateHost { file: String, label: String },

    #[error("tunnel '{tunnel_name}' is declared more than once (names are case-insensitive)")]
    DuplicateTunnel { tunnel_name: String },

    #[error("client mapping for '{label}' is declared more than once")]
    DuplicateClientMapping { label: String },

    #[error("client host '{label}' has no client mapping")]
    MissingClientMapping { label: String },

    #[error("client mapping '{label}' has no matching client host")]
    OrphanClientMapping { label: String },

    #[error("tunnel '{tunnel_name}' references unknown client '{label}'")]
    UnknownClientLabel { tunnel_name: String, label: String },

    #[error("server host list must contain exactly one host, found {count}")]
    ServerCount { count: usize },
}

/// A single device command failed.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The session broke while the command was in flight.
    #[error(transparent)]
    Transport(#[from] l2tpv6_transport::Error),

    /// The device answered with an error message.
    #[error("device rejected `{command}`: {message}")]
    Rejected { command: String, message: String },
}

/// Errors surfaced by operations outside the provisioning pass.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Connection(#[from] l2tpv6_transport::Error),

    #[error(transparent)]
    Command(#[from] CommandError),
}
