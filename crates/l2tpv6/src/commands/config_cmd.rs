//! Config subcommand handlers.

use std::fmt::Write as _;
use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};
use secrecy::SecretString;

use l2tpv6_config::{CredentialSettings, InventorySettings, USERNAME_VARS};
use l2tpv6_core::ProvisionOptions;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of the config with secrets masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    if cfg.credentials.password.is_some() {
        cfg.credentials.password = Some(REDACTED.into());
    }
    cfg
}

/// Format config for display as TOML-ish text.
fn format_config(cfg: &Config) -> String {
    let mut out = String::new();
    let inv = &cfg.inventory;
    let _ = writeln!(out, "[inventory]");
    if let Some(ref dir) = inv.dir {
        let _ = writeln!(out, "dir = \"{}\"", dir.display());
    }
    let _ = writeln!(out, "servers = \"{}\"", inv.servers.display());
    let _ = writeln!(out, "clients = \"{}\"", inv.clients.display());
    let _ = writeln!(out, "tunnels = \"{}\"", inv.tunnels.display());
    let _ = writeln!(out, "client_mappings = \"{}\"", inv.client_mappings.display());

    let creds = &cfg.credentials;
    let _ = writeln!(out, "\n[credentials]");
    if let Some(ref u) = creds.username {
        let _ = writeln!(out, "username = \"{u}\"");
    }
    if let Some(ref pw) = creds.password {
        let _ = writeln!(out, "password = \"{pw}\"");
    }
    if let Some(ref env) = creds.password_env {
        let _ = writeln!(out, "password_env = \"{env}\"");
    }
    if let Some(ref prefix) = creds.ipv6_prefix {
        let _ = writeln!(out, "ipv6_prefix = \"{prefix}\"");
    }

    let s = &cfg.session;
    let _ = writeln!(out, "\n[session]");
    let _ = writeln!(out, "connect_timeout_secs = {}", s.connect_timeout_secs);
    let _ = writeln!(out, "command_timeout_secs = {}", s.command_timeout_secs);
    let _ = writeln!(out, "ssh_port = {}", s.ssh_port);
    let _ = writeln!(out, "telnet_port = {}", s.telnet_port);
    let _ = writeln!(out, "ssh_preferred = {}", s.ssh_preferred);

    let p = &cfg.provision;
    let _ = writeln!(out, "\n[provision]");
    let _ = writeln!(out, "client_concurrency = {}", p.client_concurrency);
    let _ = writeln!(out, "create_missing_bridge = {}", p.create_missing_bridge);
    let _ = writeln!(out, "verify_after_apply = {}", p.verify_after_apply);
    let _ = writeln!(out, "probe_gateway = {}", p.probe_gateway);
    let _ = writeln!(out, "route_distance = {}", p.route_distance);
    let _ = writeln!(out, "ping_count = {}", p.ping_count);
    let targets: Vec<String> = p.external_targets.iter().map(|t| format!("\"{t}\"")).collect();
    let _ = writeln!(out, "external_targets = [{}]", targets.join(", "));
    let _ = writeln!(out, "mtu_sweep = {}", p.mtu_sweep);
    let sizes: Vec<String> = p.mtu_sizes.iter().map(ToString::to_string).collect();
    let _ = writeln!(out, "mtu_sizes = [{}]", sizes.join(", "));

    if let Some(ref log) = cfg.log_file {
        let _ = writeln!(out, "\nlog_file = \"{}\"", log.display());
    }
    out
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn require_password(pass: String) -> Result<String, CliError> {
    if pass.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }
    Ok(pass)
}

fn read_password() -> Result<String, CliError> {
    require_password(rpassword::prompt_password("Device password: ").map_err(prompt_err)?)
}

fn prompt_password() -> Result<SecretString, CliError> {
    read_password().map(SecretString::from)
}

fn username_for_keyring(user: Option<String>, global: &GlobalOpts, cfg: &Config) -> Result<String, CliError> {
    user.or_else(|| global.username.clone())
        .or_else(|| USERNAME_VARS.iter().find_map(|v| std::env::var(v).ok()))
        .or_else(|| cfg.credentials.username.clone())
        .ok_or_else(|| CliError::NoCredentials {
            reason: "no device username; pass --user".into(),
        })
}

// ── Handlers ────────────────────────────────────────────────────────

fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::active_path(global);
    eprintln!("l2tpv6 configuration wizard");
    eprintln!("   Config path: {}\n", path.display());

    if path.exists() {
        let overwrite = Confirm::new()
            .with_prompt("A config file already exists. Overwrite it?")
            .default(false)
            .interact()
            .map_err(prompt_err)?;
        if !overwrite {
            eprintln!("Nothing written.");
            return Ok(());
        }
    }

    // 1. Inventory location
    let dir: String = Input::new()
        .with_prompt("Inventory directory")
        .default(".".into())
        .interact_text()
        .map_err(prompt_err)?;

    // 2. Device login
    let username: String = Input::new()
        .with_prompt("Device username")
        .default("admin".into())
        .interact_text()
        .map_err(prompt_err)?;

    let choices = &[
        "Store in system keyring (recommended)",
        "Read from L2TPV6_PASSWORD / MIKROTIK_PASSWORD at run time",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where should the device password come from?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    let password = match selection {
        0 => {
            let secret = prompt_password()?;
            config::store_password(&username, &secret)?;
            eprintln!("   ✓ Password stored in system keyring");
            None
        }
        1 => None,
        _ => Some(read_password()?),
    };

    // 3. Base prefix (optional)
    let prefix: String = Input::new()
        .with_prompt("IPv6 base prefix (empty to skip)")
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;

    // 4. Concurrency
    let client_concurrency: usize = Input::new()
        .with_prompt("Clients to configure at the same time")
        .default(1)
        .interact_text()
        .map_err(prompt_err)?;

    let cfg = Config {
        inventory: InventorySettings {
            dir: Some(PathBuf::from(dir)),
            ..InventorySettings::default()
        },
        credentials: CredentialSettings {
            username: Some(username),
            password,
            password_env: None,
            ipv6_prefix: (!prefix.trim().is_empty()).then(|| prefix.trim().to_owned()),
        },
        provision: ProvisionOptions {
            client_concurrency,
            ..ProvisionOptions::default()
        },
        ..Config::default()
    };
    cfg.validate()?;
    config::save_config(&cfg, &path)?;

    eprintln!("\n✓ Configuration written to {}", path.display());
    eprintln!("\n  Check it: l2tpv6 validate");
    Ok(())
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let cfg = redacted(&config::load(global)?);
            let out = output::render_single(&global.output, &cfg, format_config, |_| {
                "config".into()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            let path = config::active_path(global);
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::SetPassword { user } => {
            let cfg = config::load(global)?;
            let username = username_for_keyring(user, global, &cfg)?;
            let secret = prompt_password()?;
            config::store_password(&username, &secret)?;
            eprintln!("✓ Password for '{username}' stored in system keyring");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_password_is_rejected() {
        assert!(matches!(
            require_password(String::new()),
            Err(CliError::Validation { ref field, .. }) if field == "password"
        ));
        assert_eq!(require_password("s3cret".into()).ok().as_deref(), Some("s3cret"));
    }

    #[test]
    fn show_never_prints_the_password() {
        let mut cfg = Config::default();
        cfg.credentials.username = Some("admin".into());
        cfg.credentials.password = Some("hunter2".into());

        let text = format_config(&redacted(&cfg));
        assert!(text.contains("username = \"admin\""));
        assert!(text.contains("password = \"****\""));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn formatted_config_lists_every_provision_knob() {
        let text = format_config(&Config::default());
        for line in [
            "client_concurrency = 1",
            "create_missing_bridge = false",
            "verify_after_apply = true",
            "probe_gateway = false",
            "route_distance = 1",
            "ping_count = 4",
            "external_targets = [\"2001:4860:4860::8888\", \"2001:4860:4860::8844\"]",
            "mtu_sweep = false",
            "mtu_sizes = [1280, 1300, 1400, 1500, 1600, 1700, 1800, 1900, 2000]",
        ] {
            assert!(text.contains(line), "missing {line}");
        }
    }

    #[test]
    fn formatted_config_lists_every_section() {
        let text = format_config(&Config::default());
        for section in ["[inventory]", "[credentials]", "[session]", "[provision]"] {
            assert!(text.contains(section), "missing {section}");
        }
    }
}
