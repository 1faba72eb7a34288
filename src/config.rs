//! Configuration file handling.
//!
//! This module handles loading batch settings from `.simuran.toml` files.

use crate::error::Error;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name, looked up in the working directory or a batch root.
pub const CONFIG_FILE: &str = ".simuran.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Pipeline runner settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How batches are discovered on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Manifest file name searched for under the batch root.
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,

    /// Descend into subdirectories.
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Flag signals whose source file is missing as unreadable.
    #[serde(default = "default_true")]
    pub check_files: bool,

    /// Directory names to skip while scanning.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            manifest_name: default_manifest_name(),
            recursive: true,
            check_files: true,
            excludes: default_excludes(),
        }
    }
}

fn default_manifest_name() -> String {
    "simuran.toml".to_string()
}

fn default_excludes() -> Vec<String> {
    vec!["sim_results", "__pycache__", "target"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Pipeline runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of tasks run at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Draw a progress bar while the batch runs.
    #[serde(default)]
    pub show_progress: bool,

    /// Cooperative per-task deadline.
    #[serde(default)]
    pub task_timeout_seconds: Option<u64>,

    /// Release loaded signal data once all of a recording's tasks finish.
    #[serde(default)]
    pub evict_after_task: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            show_progress: false,
            task_timeout_seconds: None,
            evict_after_task: false,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Logging settings, applied by [`crate::init_logging_from`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable debug output.
    #[serde(default)]
    pub verbose: bool,

    /// Only report errors.
    #[serde(default)]
    pub quiet: bool,
}

impl LoggingConfig {
    /// Maximum level these settings enable.
    pub fn level(&self) -> tracing::Level {
        crate::log_level(self.verbose, self.quiet)
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load configuration from a batch root directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Reject settings the runner cannot honour.
    pub fn validate(&self) -> std::result::Result<(), Error> {
        if self.pipeline.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if self.pipeline.task_timeout_seconds == Some(0) {
            return Err(Error::Config("task timeout must be at least 1 second".to_string()));
        }
        if self.discovery.manifest_name.trim().is_empty() {
            return Err(Error::Config("manifest name must not be empty".to_string()));
        }
        if self.logging.verbose && self.logging.quiet {
            return Err(Error::Config("cannot be both verbose and quiet".to_string()));
        }
        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.discovery.manifest_name, "simuran.toml");
        assert_eq!(config.pipeline.concurrency, 4);
        assert!(config.discovery.recursive);
        assert!(config.discovery.excludes.contains(&"sim_results".to_string()));
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[discovery]
manifest_name = "batch.toml"
recursive = false

[pipeline]
concurrency = 8
task_timeout_seconds = 120
evict_after_task = true

[logging]
verbose = true
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.discovery.manifest_name, "batch.toml");
        assert!(!config.discovery.recursive);
        assert!(config.discovery.check_files);
        assert_eq!(config.pipeline.concurrency, 8);
        assert_eq!(config.pipeline.task_timeout_seconds, Some(120));
        assert!(config.pipeline.evict_after_task);
        assert!(config.logging.verbose);
        assert_eq!(config.logging.level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_logging_level_from_file() {
        let config: Config = toml::from_str("[logging]\nquiet = true\n").unwrap();
        assert_eq!(config.logging.level(), tracing::Level::ERROR);
        assert_eq!(Config::default().logging.level(), tracing::Level::INFO);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[discovery]"));
        assert!(toml_str.contains("[pipeline]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.pipeline.concurrency = 0;
        assert!(config.validate().is_err());

        config.pipeline.concurrency = 2;
        config.pipeline.task_timeout_seconds = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_dir() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load_from_dir(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(CONFIG_FILE), "[pipeline]\nconcurrency = 0\n").unwrap();
        assert!(Config::load_from_dir(dir.path()).is_err());

        std::fs::write(dir.path().join(CONFIG_FILE), "[pipeline]\nconcurrency = 2\n").unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(config.pipeline.concurrency, 2);
    }
}
