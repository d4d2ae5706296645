//! Config types for siftlog.

use encoding_rs::Encoding;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Keys accepted in a config file (used for typo suggestions).
pub const KNOWN_KEYS: &[&str] = &[
    "results_file",
    "encoding",
    "chunk_size",
    "timeout_secs",
    "read_timeout_secs",
];

pub const DEFAULT_CHUNK_SIZE: usize = crate::producer::DEFAULT_CHUNK_SIZE;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw config file structure (used for parsing).
///
/// Unknown fields are rejected with an error.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Where matched lines are persisted (may contain tilde).
    pub results_file: Option<PathBuf>,
    /// WHATWG label of a single-byte encoding used to decode pages.
    pub encoding: Option<String>,
    /// Producer read size in bytes.
    pub chunk_size: Option<usize>,
    /// Transport connect timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Longest stall allowed between body reads, in seconds.
    pub read_timeout_secs: Option<u64>,
}

/// Validated configuration with defaults applied.
#[derive(Debug, Clone)]
pub struct Config {
    pub results_file: PathBuf,
    pub encoding: &'static Encoding,
    pub chunk_size: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// File the values were loaded from, if any.
    pub loaded_from: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            results_file: default_results_file(),
            encoding: crate::store::default_encoding(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            loaded_from: None,
        }
    }
}

/// `<data_dir>/siftlog/results.log`, or `results.log` in the working directory.
pub fn default_results_file() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("siftlog"))
        .unwrap_or_default()
        .join("results.log")
}
