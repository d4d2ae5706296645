//! Config loading for siftlog.
//!
//! Loads and validates YAML config files with path expansion.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use encoding_rs::Encoding;
use tracing::debug;

use crate::config::discovery::DiscoveryResult;
use crate::config::error::ConfigError;
use crate::config::types::{Config, RawConfig, KNOWN_KEYS};

/// Expand tilde in path to home directory.
///
/// Handles the following cases:
/// - `~/foo` -> `/home/user/foo`
/// - `/absolute/path` -> unchanged
/// - `relative/path` -> unchanged
pub fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    path.to_path_buf()
}

/// Resolve an encoding label to a single-byte legacy encoding.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding, String> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| format!("unknown encoding '{}'", label))?;
    if !encoding.is_single_byte() {
        return Err(format!(
            "encoding '{}' is not a single-byte encoding",
            encoding.name()
        ));
    }
    Ok(encoding)
}

/// Load and parse a YAML config file.
fn load_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    // An empty file is a valid config with every default
    if content.trim().is_empty() {
        return Ok(RawConfig::default());
    }

    serde_saphyr::from_str(&content)
        .map_err(|e| ConfigError::parse(path.to_path_buf(), e.to_string(), KNOWN_KEYS))
}

/// Apply defaults and validate a parsed config.
fn resolve(raw: RawConfig, path: &Path) -> Result<Config, ConfigError> {
    let validation = |message: String| ConfigError::Validation {
        path: path.to_path_buf(),
        message,
    };

    let mut config = Config {
        loaded_from: Some(path.to_path_buf()),
        ..Config::default()
    };

    if let Some(results_file) = raw.results_file {
        config.results_file = expand_path(&results_file);
    }
    if let Some(label) = raw.encoding {
        config.encoding = resolve_encoding(&label).map_err(validation)?;
    }
    match raw.chunk_size {
        Some(0) => return Err(validation("chunk_size must be greater than 0".to_string())),
        Some(size) => config.chunk_size = size,
        None => {}
    }
    match raw.timeout_secs {
        Some(0) => return Err(validation("timeout_secs must be greater than 0".to_string())),
        Some(secs) => config.connect_timeout = Duration::from_secs(secs),
        None => {}
    }
    match raw.read_timeout_secs {
        Some(0) => {
            return Err(validation(
                "read_timeout_secs must be greater than 0".to_string(),
            ))
        }
        Some(secs) => config.read_timeout = Duration::from_secs(secs),
        None => {}
    }

    Ok(config)
}

/// Load and validate a single config file.
pub fn load_file_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = load_file(path)?;
    resolve(raw, path)
}

/// Load the effective config (project wins over global), or defaults if none exists.
pub fn load(discovery: &DiscoveryResult) -> Result<Config, ConfigError> {
    match discovery.effective() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_file_config(path)
        }
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("siftlog.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path(Path::new("~/logs/results.log"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("logs/results.log"));
        }
    }

    #[test]
    fn test_expand_path_absolute_unchanged() {
        let path = Path::new("/var/log/results.log");
        assert_eq!(expand_path(path), path);
    }

    #[test]
    fn test_load_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "results_file: /tmp/matches.log\nencoding: koi8-r\nchunk_size: 4096\ntimeout_secs: 5\nread_timeout_secs: 7\n",
        );

        let config = load_file_config(&path).unwrap();
        assert_eq!(config.results_file, PathBuf::from("/tmp/matches.log"));
        assert_eq!(config.encoding, encoding_rs::KOI8_R);
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(7));
        assert_eq!(config.loaded_from, Some(path));
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "");

        let config = load_file_config(&path).unwrap();
        assert_eq!(config.encoding, encoding_rs::WINDOWS_1251);
        assert_eq!(config.chunk_size, crate::producer::DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_unknown_key_is_rejected_with_suggestion() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "chunk_sise: 10\n");

        match load_file_config(&path) {
            Err(ConfigError::Parse { suggestion, .. }) => {
                assert_eq!(suggestion.as_deref(), Some("chunk_size"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_chunk_size_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "chunk_size: 0\n");
        assert!(matches!(
            load_file_config(&path),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_zero_read_timeout_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "read_timeout_secs: 0\n");
        match load_file_config(&path) {
            Err(ConfigError::Validation { message, .. }) => {
                assert!(message.contains("read_timeout_secs"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_multibyte_encoding_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "encoding: utf-8\n");
        match load_file_config(&path) {
            Err(ConfigError::Validation { message, .. }) => {
                assert!(message.contains("not a single-byte"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_encoding_labels() {
        assert_eq!(resolve_encoding("cp1251").unwrap(), encoding_rs::WINDOWS_1251);
        assert_eq!(resolve_encoding(" latin1 ").unwrap(), encoding_rs::WINDOWS_1252);
        assert!(resolve_encoding("no-such-encoding").is_err());
        assert!(resolve_encoding("shift_jis").is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = load_file_config(&dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_without_config_uses_defaults() {
        let config = load(&DiscoveryResult::default()).unwrap();
        assert!(config.loaded_from.is_none());
        assert!(config.results_file.ends_with("results.log"));
    }
}
