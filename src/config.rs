//! Configuration file handling.
//!
//! This module provides loading and saving of extindex configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/extindex/config.toml`
//! - macOS: `~/Library/Application Support/extindex/config.toml`
//! - Windows: `%APPDATA%\extindex\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! extension_point_contract = "hudson.ExtensionPoint"
//! action_contract = "hudson.model.Action"
//! workers_per_core = 3
//! resource_constrained = false
//! module_timeout_secs = 600
//! on_duplicate_definition = "fail"
//! skip_modules = ["python-wrapper"]
//! default_format = "table"
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::aggregate::DuplicatePolicy;
use crate::frontend::Contracts;
use crate::model::DEFAULT_CORE_DISPLAY_NAME;

/// Application configuration.
///
/// Every field has a default, so a partial file only overrides what it
/// names. Command-line flags override the file.
///
/// # Example
///
/// ```no_run
/// use extindex::Config;
///
/// // Load from file (or use defaults if file doesn't exist)
/// let config = Config::load().unwrap();
///
/// println!("Extension point contract: {}", config.extension_point_contract);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fully-qualified name of the marker type that makes a type an
    /// extension point.
    ///
    /// Default: `hudson.ExtensionPoint`
    pub extension_point_contract: String,

    /// Fully-qualified name of the UI action contract.
    ///
    /// Default: `hudson.model.Action`
    pub action_contract: String,

    /// Display name of the core module, which is exempt from plugin name
    /// normalization.
    pub core_display_name: String,

    /// Explicit worker pool size. Overrides `workers_per_core`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Workers per available CPU when `workers` is not set.
    ///
    /// Default: 3
    pub workers_per_core: usize,

    /// Scan one module at a time, for front ends that need a lot of memory
    /// per module.
    pub resource_constrained: bool,

    /// Abandon a module whose scan takes longer than this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_timeout_secs: Option<u64>,

    /// What to do when two types define the same extension point.
    ///
    /// Valid values: "fail", "flag"
    /// Default: "fail"
    pub on_duplicate_definition: DuplicatePolicy,

    /// Artifact ids never scanned unless named explicitly.
    pub skip_modules: Vec<String>,

    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    /// Default: "table"
    pub default_format: String,
}

impl Default for Config {
    fn default() -> Self {
        let contracts = Contracts::default();
        Self {
            extension_point_contract: contracts.extension_point,
            action_contract: contracts.action,
            core_display_name: DEFAULT_CORE_DISPLAY_NAME.to_string(),
            workers: None,
            workers_per_core: 3,
            resource_constrained: false,
            module_timeout_secs: None,
            on_duplicate_definition: DuplicatePolicy::Fail,
            skip_modules: vec!["python-wrapper".to_string()],
            default_format: "table".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from an explicit path, falling back to defaults
    /// when the file is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    ///
    /// # Example
    ///
    /// ```
    /// use extindex::Config;
    ///
    /// let path = Config::config_path();
    /// assert!(path.ends_with("extindex/config.toml"));
    /// ```
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("extindex")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// The two contract names the classifier matches against.
    pub fn contracts(&self) -> Contracts {
        Contracts::new(&self.extension_point_contract, &self.action_contract)
    }
}
