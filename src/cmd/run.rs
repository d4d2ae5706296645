//! The default command: download, filter, persist, then print pages.

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use colored::Colorize;
use siftlog::config::{self, Config};
use siftlog::filter::wildcard::WildcardFilter;
use siftlog::pipeline::{Pipeline, PipelineEvent};
use siftlog::producer::HttpSource;
use siftlog::store::PagedLogStore;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exit code when the download was interrupted by a signal
pub const EXIT_CANCELLED: i32 = 130;

/// Arguments for the default download command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// URL of the text file to download
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    /// Wildcard mask lines must match (`*` any run, `?` one character)
    #[arg(value_name = "MASK")]
    pub mask: Option<String>,

    /// Results file (overrides config)
    #[arg(long, value_name = "PATH")]
    pub results: Option<PathBuf>,

    /// Legacy encoding used to decode results (overrides config)
    #[arg(long, value_name = "LABEL")]
    pub encoding: Option<String>,

    /// Print at most this many pages of results (default: all)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub pages: Option<u64>,
}

/// Run the pipeline and print results. Returns the process exit code.
pub fn run(args: RunArgs) -> Result<i32> {
    let (Some(url), Some(mask)) = (args.url, args.mask) else {
        eprintln!("Usage: siftlog <URL> <MASK>");
        eprintln!("       siftlog config <validate|show>");
        return Ok(2);
    };

    let mut cfg = config::load(&config::discover())?;
    if let Some(results) = args.results {
        cfg.results_file = results;
    }
    if let Some(label) = args.encoding {
        cfg.encoding = config::resolve_encoding(&label).map_err(|e| anyhow!(e))?;
    }

    let store = Arc::new(
        PagedLogStore::open(&cfg.results_file, cfg.encoding)
            .with_context(|| format!("Failed to open results file {}", cfg.results_file.display()))?,
    );

    match download(&url, &mask, &cfg, &store)? {
        Outcome::Finished { matched } => {
            eprintln!(
                "{} ({} matching lines)",
                "Download completed".green(),
                matched
            );
            print_pages(&store, args.pages, &mut io::stdout().lock())?;
            store.close();
            Ok(0)
        }
        Outcome::Failed(message) => {
            eprintln!("{}: {}", "Download error".red(), message);
            Ok(1)
        }
        Outcome::Cancelled => {
            eprintln!("{}", "Download cancelled".yellow());
            Ok(EXIT_CANCELLED)
        }
    }
}

enum Outcome {
    Finished { matched: usize },
    Failed(String),
    Cancelled,
}

fn download(url: &str, mask: &str, cfg: &Config, store: &Arc<PagedLogStore>) -> Result<Outcome> {
    let shutdown = crate::signal::setup_shutdown_handlers()
        .context("Failed to install signal handlers")?;
    let show_progress = io::stderr().is_terminal();

    let (tx, rx) = channel();
    let source = HttpSource::new(url)
        .with_connect_timeout(cfg.connect_timeout)
        .with_read_timeout(cfg.read_timeout);
    let pipeline = Pipeline::start(
        source,
        Arc::new(WildcardFilter::new(mask)),
        Arc::clone(store),
        cfg.chunk_size,
        tx,
    )?;

    let outcome = loop {
        if shutdown.load(Ordering::SeqCst) {
            pipeline.cancel();
        }

        match rx.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok(PipelineEvent::Progress(progress)) => {
                if show_progress {
                    eprint!("\rDownloaded {:.2}%", progress * 100.0);
                }
            }
            Ok(PipelineEvent::WriteFailed(e)) => {
                warn!(error = %e, "failed to persist a matched line");
            }
            Ok(PipelineEvent::Finished { matched }) => break Outcome::Finished { matched },
            Ok(PipelineEvent::Failed(e)) => break Outcome::Failed(e.to_string()),
            Ok(PipelineEvent::Cancelled) => break Outcome::Cancelled,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => bail!("pipeline stopped without reporting"),
        }
    };

    if show_progress {
        eprintln!();
    }
    Ok(outcome)
}

/// Print the pages loaded so far, then keep paging until the limit or the end.
fn print_pages(store: &PagedLogStore, limit: Option<u64>, out: &mut impl Write) -> Result<()> {
    let mut printed = 0usize;
    let mut pages = 0u64;
    loop {
        if limit.is_some_and(|limit| pages >= limit) {
            break;
        }
        // The pipeline already loaded the first page
        if pages > 0 {
            store.load_next_page(|_| {})?;
            store.sync()?;
        }

        let lines = store.displayed_lines();
        if pages > 0 && lines.len() == printed {
            break;
        }
        for line in &lines[printed..] {
            writeln!(out, "{}", line)?;
        }
        printed = lines.len();
        pages += 1;
    }

    out.flush()?;
    Ok(())
}
