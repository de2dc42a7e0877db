//! Configuration file loading and management
//!
//! This module handles loading and parsing the daemon configuration from
//! `$XDG_CONFIG_HOME/hostbridge/config.toml`, or from the path named by
//! `HOSTBRIDGE_CONFIG`. If the default configuration file doesn't exist, a
//! default configuration is created with documented comments.

use anyhow::{Context, Result};
use hostbridge_core::{ExtensionSettings, MapEnv, RuntimeConfig, SchedulingMode, TeardownPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the configuration file path
pub const CONFIG_PATH_ENV: &str = "HOSTBRIDGE_CONFIG";

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Extensions to activate; all registered extensions when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activate: Option<Vec<String>>,
    /// Runtime behavior
    #[serde(default)]
    pub runtime: RuntimeSection,
    /// Per-extension settings
    #[serde(default)]
    pub extensions: HashMap<String, ExtensionSettings>,
    /// Values layered above the process environment
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeSection {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Where dispatched callbacks run: "cooperative" or "worker"
    /// Default: "cooperative"
    #[serde(default)]
    pub scheduling: SchedulingMode,
    /// What happens to queued callbacks at unload: "drain" or "discard"
    /// Default: "drain"
    #[serde(default)]
    pub teardown: TeardownPolicy,
    /// How often the cooperative scheduler drains pending callbacks
    /// Default: 100
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_interval_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            activate: None,
            runtime: RuntimeSection::default(),
            extensions: HashMap::new(),
            environment: HashMap::new(),
        }
    }
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            scheduling: SchedulingMode::default(),
            teardown: TeardownPolicy::default(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Config {
    /// Load configuration from the specified path
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// The parsed configuration or an error if loading/parsing fails
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `HOSTBRIDGE_CONFIG` or the default XDG location
    ///
    /// An explicit path must exist. At the default location a documented
    /// default file is created if missing.
    pub fn load_default() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Self::load(PathBuf::from(path));
        }

        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/hostbridge/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "hostbridge", "hostbridge")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Create a default configuration file with documented comments
    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    pub fn default_config_content() -> String {
        r#"# hostbridge Daemon Configuration
# This file configures which extensions are activated and how their
# dispatched callbacks are scheduled.

# Extensions to activate. Omit to activate every linked extension.
# activate = ["hello"]

[runtime]
# Log level: trace, debug, info, warn, error
# RUST_LOG takes precedence when set.
# Default: "info"
log_level = "info"

# Where dispatched callbacks run:
# - "cooperative": drained on the daemon's main loop every tick
# - "worker": drained by a background task per extension
# Default: "cooperative"
scheduling = "cooperative"

# What happens to callbacks still queued when an extension is unloaded:
# - "drain": run them all, in order, before unloading
# - "discard": drop them, logging each one
# Default: "drain"
teardown = "drain"

# Cooperative drain interval in milliseconds
# Default: 100
tick_interval_ms = 100

# Per-extension settings
# - enabled: whether the extension may be activated (default: true)
# - init_data: any TOML value, passed to the extension's initializer
#
# [extensions.hello]
# enabled = true
# init_data = { greeting = "hi" }

# Values layered above the process environment, visible to extensions
# through get_env.
[environment]
# HOME = "/srv/hostbridge"
"#
        .to_string()
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are valid and within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.runtime.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log_level: {}. Must be one of: {}",
                self.runtime.log_level,
                valid_log_levels.join(", ")
            );
        }

        if self.runtime.tick_interval_ms == 0 {
            anyhow::bail!("runtime.tick_interval_ms must be greater than 0");
        }

        if let Some(names) = &self.activate {
            if names.iter().any(|n| n.trim().is_empty()) {
                anyhow::bail!("activate must not contain empty extension names");
            }
        }

        if self.extensions.keys().any(|n| n.trim().is_empty()) {
            anyhow::bail!("extensions must not contain an empty extension name");
        }

        Ok(())
    }

    /// Policy handed to the extension host
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            scheduling: self.runtime.scheduling,
            teardown: self.runtime.teardown,
            activate: self.activate.clone(),
            extensions: self.extensions.clone(),
        }
    }

    /// Environment overrides as a store
    pub fn environment_overrides(&self) -> MapEnv {
        self.environment
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostbridge_core::EnvStore;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.runtime.log_level, "info");
        assert_eq!(config.runtime.scheduling, SchedulingMode::Cooperative);
        assert_eq!(config.runtime.teardown, TeardownPolicy::Drain);
        assert_eq!(config.runtime.tick_interval_ms, 100);
        assert!(config.activate.is_none());
        assert!(config.extensions.is_empty());
        assert!(config.environment.is_empty());
    }

    #[test]
    fn test_default_content_parses() {
        let config: Config = toml::from_str(&Config::default_config_content()).unwrap();
        config.validate().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
activate = ["hello"]

[runtime]
log_level = "debug"
scheduling = "worker"
teardown = "discard"
tick_interval_ms = 250

[extensions.hello]
init_data = { greeting = "hi" }

[extensions.other]
enabled = false

[environment]
HOME = "/srv/hostbridge"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(config_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.runtime.log_level, "debug");
        assert_eq!(config.runtime.scheduling, SchedulingMode::Worker);
        assert_eq!(config.runtime.teardown, TeardownPolicy::Discard);
        assert_eq!(config.runtime.tick_interval_ms, 250);
        assert_eq!(config.activate, Some(vec!["hello".to_string()]));
        assert!(!config.extensions["other"].enabled);

        let runtime = config.runtime_config();
        assert!(runtime.is_enabled("hello"));
        assert!(!runtime.is_enabled("other"));
        assert!(runtime.init_data("hello").is_some());

        let env = config.environment_overrides();
        assert_eq!(env.get("HOME").as_deref(), Some("/srv/hostbridge"));
    }

    #[test]
    fn test_load_minimal_config() {
        let config_content = r#"
[runtime]
log_level = "warn"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(config_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.runtime.log_level, "warn");
        assert_eq!(config.runtime.tick_interval_ms, 100);
        assert!(config.extensions.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/hostbridge/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.runtime.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_tick() {
        let mut config = Config::default();
        config.runtime.tick_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_activate_name() {
        let mut config = Config::default();
        config.activate = Some(vec!["hello".to_string(), " ".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path().unwrap();
        assert!(path.to_string_lossy().contains("hostbridge"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_full_config_roundtrip() {
        let mut config = Config::default();
        config.runtime.log_level = "debug".to_string();
        config.activate = Some(vec!["hello".to_string()]);
        config
            .environment
            .insert("HOME".to_string(), "/tmp".to_string());

        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, deserialized);
    }
}
