//! CLI subcommands and the default download command for siftlog.

pub mod config;
pub mod run;

use clap::Subcommand;

/// Available subcommands for siftlog.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Config file commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommand actions.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the config file
    Validate,
    /// Show effective configuration
    Show,
}
