//! Config validate and show commands for siftlog.

use colored::Colorize;
use siftlog::config::{self, Config};

/// Validate the effective config file.
///
/// Follows Unix conventions:
/// - Exit 0 with no output on success (quiet success)
/// - Exit 1 with error message to stderr on failure
pub fn validate() -> Result<(), i32> {
    let discovery = config::discover();
    let Some(path) = discovery.effective() else {
        eprintln!("error: No config found to validate");
        return Err(1);
    };

    match config::load_file_config(path) {
        Ok(_) => Ok(()),
        Err(e) => {
            eprintln!("{}", e);
            Err(1)
        }
    }
}

/// Show the effective configuration, defaults included.
///
/// Respects NO_COLOR environment variable via the colored crate.
pub fn show() -> Result<(), i32> {
    let discovery = config::discover();
    match config::load(&discovery) {
        Ok(cfg) => {
            match &cfg.loaded_from {
                Some(path) => println!("Using: {}", path.display().to_string().dimmed()),
                None => println!("{}", "No config found. Using defaults.".dimmed()),
            }
            println!();
            show_config(&cfg);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e);
            Err(1)
        }
    }
}

fn show_config(cfg: &Config) {
    println!(
        "{}: {}",
        "results_file".cyan(),
        cfg.results_file.display().to_string().yellow()
    );
    println!("{}: {}", "encoding".cyan(), cfg.encoding.name().green());
    println!("{}: {}", "chunk_size".cyan(), cfg.chunk_size);
    println!(
        "{}: {}",
        "timeout_secs".cyan(),
        cfg.connect_timeout.as_secs()
    );
    println!(
        "{}: {}",
        "read_timeout_secs".cyan(),
        cfg.read_timeout.as_secs()
    );
}
