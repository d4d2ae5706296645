//! Config discovery for siftlog.
//!
//! Walks parent directories to find `siftlog.yaml` and checks for a global
//! config at `<config_dir>/siftlog/config.yaml`.

use std::path::{Path, PathBuf};

/// Project config filename to search for in parent directories.
pub const PROJECT_CONFIG_NAME: &str = "siftlog.yaml";

/// Global config filename within the siftlog config directory.
pub const GLOBAL_CONFIG_NAME: &str = "config.yaml";

/// Result of config discovery.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    /// Full path to the project config file (`siftlog.yaml`).
    pub project_config: Option<PathBuf>,
    /// Full path to the global config file.
    pub global_config: Option<PathBuf>,
}

impl DiscoveryResult {
    /// The config that applies: project config wins completely over global.
    pub fn effective(&self) -> Option<&Path> {
        self.project_config
            .as_deref()
            .or(self.global_config.as_deref())
    }
}

/// Discover config files starting from the current working directory.
pub fn discover() -> DiscoveryResult {
    let mut result = match std::env::current_dir() {
        Ok(dir) => discover_from(&dir.canonicalize().unwrap_or(dir)),
        Err(_) => DiscoveryResult::default(),
    };
    result.global_config = global_config_path();
    result
}

/// Walk `start` and its ancestors looking for a project config.
///
/// Only fills `project_config`; the global config is looked up by [`discover`].
pub fn discover_from(start: &Path) -> DiscoveryResult {
    let project_config = start
        .ancestors()
        .map(|ancestor| ancestor.join(PROJECT_CONFIG_NAME))
        .find(|path| path.try_exists().unwrap_or(false) && path.is_file());

    DiscoveryResult {
        project_config,
        global_config: None,
    }
}

fn global_config_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("siftlog").join(GLOBAL_CONFIG_NAME);
    (path.try_exists().unwrap_or(false) && path.is_file()).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_finds_config_in_start_dir() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(PROJECT_CONFIG_NAME);
        fs::write(&config_path, "chunk_size: 10").unwrap();

        let result = discover_from(temp.path());
        assert_eq!(result.project_config, Some(config_path));
    }

    #[test]
    fn test_finds_config_in_parent_dir() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("level1").join("level2");
        fs::create_dir_all(&subdir).unwrap();
        let config_path = temp.path().join(PROJECT_CONFIG_NAME);
        fs::write(&config_path, "chunk_size: 10").unwrap();

        let result = discover_from(&subdir);
        assert_eq!(result.project_config, Some(config_path));
    }

    #[test]
    fn test_directory_with_config_name_is_ignored() {
        let temp = TempDir::new().unwrap();
        let subdir = temp.path().join("work");
        fs::create_dir_all(subdir.join(PROJECT_CONFIG_NAME)).unwrap();
        let config_path = temp.path().join(PROJECT_CONFIG_NAME);
        fs::write(&config_path, "").unwrap();

        let result = discover_from(&subdir);
        assert_eq!(result.project_config, Some(config_path));
    }

    #[test]
    fn test_effective_prefers_project() {
        let empty = DiscoveryResult::default();
        assert!(empty.effective().is_none());

        let global_only = DiscoveryResult {
            global_config: Some(PathBuf::from("/home/user/.config/siftlog/config.yaml")),
            ..Default::default()
        };
        assert_eq!(
            global_only.effective(),
            Some(Path::new("/home/user/.config/siftlog/config.yaml"))
        );

        let both = DiscoveryResult {
            project_config: Some(PathBuf::from("/work/siftlog.yaml")),
            global_config: Some(PathBuf::from("/home/user/.config/siftlog/config.yaml")),
        };
        assert_eq!(both.effective(), Some(Path::new("/work/siftlog.yaml")));
    }
}
