//! Command handlers, one module per top-level subcommand.

pub mod config_cmd;
pub mod discover;
pub mod probe;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Route a parsed command to its handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Probe(args) => probe::handle(args, global).await,
        Command::Discover(args) => discover::handle(args, global).await,
        Command::Watch(args) => watch::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(&args, global),
        Command::Completions(_) => Err(CliError::Internal(
            "completions are generated before dispatch".into(),
        )),
    }
}
