//! CLI argument definitions for the harness binary.

use clap::{Parser, Subcommand};
use harness_config::Config;

/// Starts a service fixture, checks it, and tears it down.
#[derive(Parser, Debug)]
#[command(name = "harness", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Layered harness configuration.
    #[command(flatten)]
    pub(crate) config: Config,
    /// Action to perform.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Harness actions.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Starts the service, requests each path, and shuts it down again.
    Probe {
        /// Paths or same-origin URLs to request.
        #[arg(value_name = "PATH", default_value = "/")]
        paths: Vec<String>,
    },
    /// Starts the service and keeps it running until interrupted.
    Run,
}
