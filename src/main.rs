mod cmd;
mod signal;

use anyhow::Result;
use clap::{ArgAction, Parser};
use cmd::{ConfigAction, Commands};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "siftlog", version)]
#[command(about = "Download a text file, keep the lines matching a wildcard mask, and page through them", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: cmd::run::RunArgs,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("siftlog={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let code = match args.command {
        Some(Commands::Config { action }) => {
            let result = match action {
                ConfigAction::Validate => cmd::config::validate(),
                ConfigAction::Show => cmd::config::show(),
            };
            result.err().unwrap_or(0)
        }
        None => cmd::run::run(args.run)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
