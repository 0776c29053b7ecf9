//! Clap derive structures for the `l2tpv6` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// l2tpv6 -- IPv6 provisioning for RouterOS L2TP fleets
#[derive(Debug, Parser)]
#[command(
    name = "l2tpv6",
    version,
    about = "Provision IPv6 over L2TP tunnels on RouterOS servers and clients",
    long_about = "Reads a flat-file inventory of one L2TP server and its clients,\n\
        puts the server-side IPv6 address and client route on every running\n\
        tunnel, then gives each client its bridge address and default route.\n\n\
        Every step reads device state first and only adds what is missing,\n\
        so re-running is safe.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (default: platform config dir)
    #[arg(long, env = "L2TPV6_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the inventory files
    #[arg(long, short = 'i', env = "L2TPV6_INVENTORY_DIR", global = true)]
    pub inventory_dir: Option<PathBuf>,

    /// Device login (overrides env and config)
    #[arg(long, short = 'u', global = true)]
    pub username: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "L2TPV6_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Also write a plain-text log to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table or text report (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the server and every client
    #[command(alias = "run")]
    Provision(ProvisionArgs),

    /// Load and cross-check the inventory without contacting devices
    #[command(alias = "check")]
    Validate,

    /// Show the resolved hosts and mappings
    #[command(alias = "inv")]
    Inventory,

    /// List the server's running tunnels and the mapping each resolves to
    Tunnels,

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PROVISION
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ProvisionArgs {
    /// Clients configured at the same time
    #[arg(long, short = 'j')]
    pub client_concurrency: Option<usize>,

    /// Also write the report here (JSON when the name ends in .json)
    #[arg(long, short = 'r')]
    pub report: Option<PathBuf>,

    /// Create a missing client bridge instead of failing the step
    #[arg(long)]
    pub create_missing_bridge: bool,

    /// Check each client's gateway and external reachability after configuring it
    #[arg(long)]
    pub probe_gateway: bool,

    /// Also find the path MTU to the gateway (implies --probe-gateway)
    #[arg(long)]
    pub mtu_sweep: bool,

    /// Skip re-reading state after each change
    #[arg(long)]
    pub no_verify: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Print the config file location
    Path,

    /// Store the device password in the system keyring
    SetPassword {
        /// Device login (default: resolved username)
        #[arg(long)]
        user: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
