//! CLI configuration -- thin wrapper around `l2tpv6_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` overrides (--config,
//! --inventory-dir, --username, --log-file).

use std::path::PathBuf;

use l2tpv6_core::Inventory;
use l2tpv6_transport::RouterOsConnector;
use tracing::debug;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use l2tpv6_config::{Config, config_path, save_config, store_password};

// ── CLI-specific helpers ────────────────────────────────────────────

/// The config file in effect: `--config` or the platform default.
pub fn active_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Load config from `--config` (which must exist) or the default location.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(l2tpv6_config::load_config(global.config.as_deref())?)
}

/// Log file from the flag, else from config. Config errors are left for
/// the command to report.
pub fn log_file(global: &GlobalOpts) -> Option<PathBuf> {
    global
        .log_file
        .clone()
        .or_else(|| load(global).ok().and_then(|cfg| cfg.log_file))
}

/// Read and resolve the four inventory files.
pub fn load_inventory(global: &GlobalOpts, cfg: &Config) -> Result<Inventory, CliError> {
    let paths = cfg.inventory_paths(global.inventory_dir.as_deref());
    debug!(servers = %paths.servers.display(), "loading inventory");
    Ok(Inventory::load(&paths)?)
}

/// A connector carrying the resolved device login.
pub fn connector(global: &GlobalOpts, cfg: &Config) -> Result<RouterOsConnector, CliError> {
    let credentials =
        l2tpv6_config::resolve_credentials(&cfg.credentials, global.username.as_deref())?;
    debug!(username = %credentials.username, "credentials resolved");
    Ok(RouterOsConnector::new(cfg.session_config(credentials)))
}
