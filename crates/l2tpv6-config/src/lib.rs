//! Configuration for the l2tpv6 provisioner.
//!
//! Defaults, then a TOML file, then `L2TPV6_` environment variables
//! (`__` separates nested keys, e.g. `L2TPV6_SESSION__SSH_PORT`). Device
//! credentials resolve through their own chain: flag, environment,
//! keyring, plaintext. The binary layers its `GlobalOpts` overrides on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use l2tpv6_core::inventory::{
    CLIENT_HOSTS_FILE, CLIENT_MAPPING_FILE, SERVER_HOSTS_FILE, TUNNEL_MAPPING_FILE,
};
use l2tpv6_core::{InventoryPaths, Ipv6Cidr, ProvisionOptions};
use l2tpv6_transport::{SessionConfig, Transport};

const KEYRING_SERVICE: &str = "l2tpv6";

/// Username variables, in lookup order.
pub const USERNAME_VARS: [&str; 2] = ["L2TPV6_USERNAME", "MIKROTIK_USERNAME"];
/// Password variables, in lookup order.
pub const PASSWORD_VARS: [&str; 2] = ["L2TPV6_PASSWORD", "MIKROTIK_PASSWORD"];

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("no device username configured")]
    NoUsername,

    #[error("no password found for device user '{username}'")]
    NoPassword { username: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub inventory: InventorySettings,

    #[serde(default)]
    pub credentials: CredentialSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub provision: ProvisionOptions,

    /// Also write a plain-text log here.
    pub log_file: Option<PathBuf>,
}

/// Where the four inventory files live. Relative file paths are resolved
/// against `dir`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct InventorySettings {
    pub dir: Option<PathBuf>,
    pub servers: PathBuf,
    pub clients: PathBuf,
    pub tunnels: PathBuf,
    pub client_mappings: PathBuf,
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            dir: None,
            servers: SERVER_HOSTS_FILE.into(),
            clients: CLIENT_HOSTS_FILE.into(),
            tunnels: TUNNEL_MAPPING_FILE.into(),
            client_mappings: CLIENT_MAPPING_FILE.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CredentialSettings {
    /// Device login shared by every host.
    pub username: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Operator base prefix; `validate` warns about addresses outside it.
    pub ipv6_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSettings {
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub ssh_port: u16,
    pub telnet_port: u16,
    /// Try SSH first on hosts declared as Telnet.
    pub ssh_preferred: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            command_timeout_secs: 30,
            ssh_port: Transport::Ssh.default_port(),
            telnet_port: Transport::Telnet.default_port(),
            ssh_preferred: true,
        }
    }
}

/// Resolved device login.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Config {
    /// Reject values that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provision.client_concurrency == 0 {
            return Err(ConfigError::Validation {
                field: "provision.client_concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.session.connect_timeout_secs == 0 || self.session.command_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "session".into(),
                reason: "timeouts must be greater than zero".into(),
            });
        }
        if self.provision.ping_count == 0 {
            return Err(ConfigError::Validation {
                field: "provision.ping_count".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.provision.mtu_sweep && self.provision.mtu_sizes.is_empty() {
            return Err(ConfigError::Validation {
                field: "provision.mtu_sizes".into(),
                reason: "the MTU sweep needs at least one size".into(),
            });
        }
        self.base_prefix()?;
        Ok(())
    }

    /// The operator base prefix, if configured.
    pub fn base_prefix(&self) -> Result<Option<Ipv6Cidr>, ConfigError> {
        self.credentials
            .ipv6_prefix
            .as_deref()
            .map(|raw| {
                raw.parse::<Ipv6Cidr>().map_err(|e| ConfigError::Validation {
                    field: "credentials.ipv6_prefix".into(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Inventory file locations. `dir_override` (from the command line)
    /// wins over `inventory.dir`; absolute file paths ignore both.
    pub fn inventory_paths(&self, dir_override: Option<&Path>) -> InventoryPaths {
        let dir = dir_override
            .or(self.inventory.dir.as_deref())
            .unwrap_or_else(|| Path::new("."));
        InventoryPaths {
            servers: dir.join(&self.inventory.servers),
            clients: dir.join(&self.inventory.clients),
            tunnels: dir.join(&self.inventory.tunnels),
            client_mappings: dir.join(&self.inventory.client_mappings),
        }
    }

    pub fn session_config(&self, credentials: Credentials) -> SessionConfig {
        SessionConfig {
            username: credentials.username,
            password: credentials.password,
            connect_timeout: Duration::from_secs(self.session.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.session.command_timeout_secs),
            ssh_port: self.session.ssh_port,
            telnet_port: self.session.telnet_port,
            ssh_preferred: self.session.ssh_preferred,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("net", "l2tpv6", "l2tpv6").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("l2tpv6");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults merged with the TOML file at `path`.
pub fn file_figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
}

/// Load the full Config from file + environment.
///
/// An explicit `path` must exist; the default location may be absent.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound { path: p.into() });
        }
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    let config: Config = file_figment(&path)
        .merge(Env::prefixed("L2TPV6_").split("__"))
        .extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the device login from the process environment and keyring.
pub fn resolve_credentials(
    settings: &CredentialSettings,
    username_flag: Option<&str>,
) -> Result<Credentials, ConfigError> {
    resolve_credentials_with(
        settings,
        username_flag,
        |name| std::env::var(name).ok(),
        keyring_password,
    )
}

/// Credential chain with injectable lookups.
///
/// Username: flag, `L2TPV6_USERNAME`, `MIKROTIK_USERNAME`, config.
/// Password: `password_env`, `L2TPV6_PASSWORD`, `MIKROTIK_PASSWORD`,
/// keyring, config.
pub fn resolve_credentials_with<E, K>(
    settings: &CredentialSettings,
    username_flag: Option<&str>,
    env: E,
    keyring: K,
) -> Result<Credentials, ConfigError>
where
    E: Fn(&str) -> Option<String>,
    K: Fn(&str) -> Option<String>,
{
    let username = username_flag
        .map(str::to_owned)
        .or_else(|| USERNAME_VARS.iter().find_map(|v| env(v)))
        .or_else(|| settings.username.clone())
        .ok_or(ConfigError::NoUsername)?;

    let password = settings
        .password_env
        .as_deref()
        .and_then(&env)
        .or_else(|| PASSWORD_VARS.iter().find_map(|v| env(v)))
        .or_else(|| keyring(&username))
        .or_else(|| settings.password.clone())
        .ok_or_else(|| ConfigError::NoPassword {
            username: username.clone(),
        })?;

    Ok(Credentials {
        username,
        password: SecretString::from(password),
    })
}

fn keyring_entry(username: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{username}/password"))
}

fn keyring_password(username: &str) -> Option<String> {
    keyring_entry(username).ok()?.get_password().ok()
}

/// Store the device password for `username` in the system keyring.
pub fn store_password(username: &str, password: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(username)?.set_password(password.expose_secret())?;
    Ok(())
}
