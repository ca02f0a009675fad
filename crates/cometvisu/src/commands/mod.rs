//! Command dispatch: bridges CLI args -> client operations -> output formatting.

pub mod backends;
pub mod config_cmd;
pub mod login;
pub mod watch;
pub mod write;

use cometvisu_core::Client;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a backend-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, client: &Client, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Login => login::handle(client, global).await,
        Command::Watch(args) => watch::handle(client, args, global).await,
        Command::Write(args) => write::handle(client, args, global).await,
        // Handled before a client exists
        Command::Backends | Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
