//! CLI error types with miette diagnostics.
//!
//! Maps library errors into user-facing errors with actionable help text
//! and a stable process exit code.

use miette::Diagnostic;
use thiserror::Error;

use l2tpv6_config::ConfigError;
use l2tpv6_core::{CommandError, CoreError, InventoryError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const INVENTORY: i32 = 3;
    pub const DEVICES_FAILED: i32 = 4;
    pub const CONNECTION: i32 = 5;
    pub const AUTH: i32 = 6;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Inventory ────────────────────────────────────────────────────

    #[error("Inventory error: {0}")]
    #[diagnostic(
        code(l2tpv6::inventory),
        help(
            "Fix the inventory files and run `l2tpv6 validate` again.\n\
             Use --inventory-dir to point at a different directory."
        )
    )]
    Inventory(#[from] InventoryError),

    // ── Run outcome ──────────────────────────────────────────────────

    #[error("{failed} of {total} devices failed, {partial} partially configured")]
    #[diagnostic(
        code(l2tpv6::devices_failed),
        help("See the failures section of the report. Re-running is safe.")
    )]
    DevicesFailed {
        failed: usize,
        partial: usize,
        total: usize,
    },

    // ── Devices ──────────────────────────────────────────────────────

    #[error("Could not reach {host}")]
    #[diagnostic(
        code(l2tpv6::connection_failed),
        help("Check the address, the ssh/telnet service on the device and --config [session] ports.")
    )]
    ConnectionFailed {
        host: String,
        #[source]
        source: l2tpv6_transport::Error,
    },

    #[error("Device command failed: {0}")]
    #[diagnostic(code(l2tpv6::command))]
    Command(#[from] CommandError),

    // ── Credentials ──────────────────────────────────────────────────

    #[error("No device credentials: {reason}")]
    #[diagnostic(
        code(l2tpv6::no_credentials),
        help(
            "Set L2TPV6_USERNAME / L2TPV6_PASSWORD (or MIKROTIK_USERNAME / MIKROTIK_PASSWORD),\n\
             or run: l2tpv6 config set-password"
        )
    )]
    NoCredentials { reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(l2tpv6::validation))]
    Validation { field: String, reason: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(l2tpv6::no_config),
        help(
            "Create one with: l2tpv6 config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {0}")]
    #[diagnostic(code(l2tpv6::config))]
    Config(ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    #[diagnostic(code(l2tpv6::json))]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization failed: {0}")]
    #[diagnostic(code(l2tpv6::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Inventory(_) => exit_code::INVENTORY,
            Self::DevicesFailed { .. } => exit_code::DEVICES_FAILED,
            Self::ConnectionFailed { source, .. } if is_auth(source) => exit_code::AUTH,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Validation { .. } | Self::NoConfig { .. } | Self::Config(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

fn is_auth(err: &l2tpv6_transport::Error) -> bool {
    matches!(err, l2tpv6_transport::Error::Authentication { .. })
}

// ── Library error mapping ────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => CliError::NoConfig {
                path: path.display().to_string(),
            },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            e @ (ConfigError::NoUsername | ConfigError::NoPassword { .. }) => {
                CliError::NoCredentials {
                    reason: e.to_string(),
                }
            }
            other => CliError::Config(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Inventory(e) => CliError::Inventory(e),
            CoreError::Connection(source) => CliError::ConnectionFailed {
                host: connection_host(&source),
                source,
            },
            CoreError::Command(e) => CliError::Command(e),
        }
    }
}

fn connection_host(err: &l2tpv6_transport::Error) -> String {
    use l2tpv6_transport::Error;
    match err {
        Error::Connect { address, .. }
        | Error::Authentication { address, .. }
        | Error::Exhausted { address, .. }
        | Error::Closed { address } => address.clone(),
        _ => "device".into(),
    }
}
