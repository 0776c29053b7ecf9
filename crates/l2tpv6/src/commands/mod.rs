//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod inventory;
pub mod provision;
pub mod tunnels;
pub mod validate;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch an inventory-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Provision(args) => provision::handle(args, global).await,
        Command::Validate => validate::handle(global),
        Command::Inventory => inventory::handle(global),
        Command::Tunnels => tunnels::handle(global).await,
        Command::Config(args) => config_cmd::handle(args, global),
        // Completions are handled before dispatch
        Command::Completions(_) => Ok(()),
    }
}
