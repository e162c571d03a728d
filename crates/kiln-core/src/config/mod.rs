//! # Kiln Configuration
//!
//! [`KilnConfig`] describes a registry: where artifacts and clones live, how
//! the external tools are invoked, the values handed to every plugin's
//! `Init`, and the plugins to register. It can be read from JSON, TOML or
//! (with the `yaml-config` feature) YAML, picked by file extension.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_GIT_SCHEME, DEFAULT_ROOT_DIR, DEFAULT_WORKERS, TEST_PASS_MARKER};
use crate::error::{Error, Result};
use crate::plugin_system::source::DedupeStrategy;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON format (.json)
    Json,
    /// TOML format (.toml)
    Toml,
    /// YAML format (.yaml, .yml) - requires "yaml-config" feature
    #[cfg(feature = "yaml-config")]
    Yaml,
}

impl ConfigFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Json => "json",
            ConfigFormat::Toml => "toml",
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => "yaml",
        }
    }

    /// Determine format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                "toml" => Some(ConfigFormat::Toml),
                #[cfg(feature = "yaml-config")]
                "yaml" | "yml" => Some(ConfigFormat::Yaml),
                _ => None,
            })
    }
}

/// How `git` is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub program: String,
    /// Scheme used to turn `host/user/repo` into a clone URL.
    pub scheme: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            scheme: DEFAULT_GIT_SCHEME.to_string(),
        }
    }
}

/// How `cargo` is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CargoConfig {
    pub program: String,
    pub release: bool,
    /// Substring of passing test output.
    pub pass_marker: String,
    /// Shared target directory; each plugin builds into its own when unset.
    pub target_dir: Option<PathBuf>,
}

impl Default for CargoConfig {
    fn default() -> Self {
        Self {
            program: "cargo".to_string(),
            release: false,
            pass_marker: TEST_PASS_MARKER.to_string(),
            target_dir: None,
        }
    }
}

/// A plugin to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub key: String,
    #[serde(default)]
    pub update: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    /// Directory holding one artifact per plugin.
    pub root_dir: PathBuf,
    /// Clone cache; `<root_dir>/sources` when unset.
    pub source_dir: Option<PathBuf>,
    /// Branch override applied to every repository plugin on retrieve.
    pub branch: Option<String>,
    /// Workers used by the concurrent build and test.
    pub workers: usize,
    pub dedupe: DedupeStrategy,
    /// Extra directories searched for artifacts at load time.
    pub search_paths: Vec<PathBuf>,
    pub git: GitConfig,
    pub cargo: CargoConfig,
    /// Values passed to every plugin's `Init`.
    pub env: HashMap<String, String>,
    pub plugins: Vec<PluginEntry>,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            source_dir: None,
            branch: None,
            workers: DEFAULT_WORKERS,
            dedupe: DedupeStrategy::default(),
            search_paths: Vec::new(),
            git: GitConfig::default(),
            cargo: CargoConfig::default(),
            env: HashMap::new(),
            plugins: Vec::new(),
        }
    }
}

impl KilnConfig {
    /// Deserialize from string based on format
    pub fn deserialize(data: &str, format: ConfigFormat) -> std::result::Result<Self, String> {
        match format {
            ConfigFormat::Json => serde_json::from_str(data)
                .map_err(|e| format!("Failed to deserialize from JSON: {}", e)),
            ConfigFormat::Toml => {
                toml::from_str(data).map_err(|e| format!("Failed to deserialize from TOML: {}", e))
            }
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::from_str(data)
                .map_err(|e| format!("Failed to deserialize from YAML: {}", e)),
        }
    }

    /// Serialize to string based on format
    pub fn serialize(&self, format: ConfigFormat) -> std::result::Result<String, String> {
        match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| format!("Failed to serialize to JSON: {}", e)),
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| format!("Failed to serialize to TOML: {}", e)),
            #[cfg(feature = "yaml-config")]
            ConfigFormat::Yaml => serde_yaml::to_string(self)
                .map_err(|e| format!("Failed to serialize to YAML: {}", e)),
        }
    }

    /// Load a configuration file, choosing the format by extension.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path).ok_or_else(|| Error::Config {
            path: path.to_path_buf(),
            message: "unsupported configuration format".to_string(),
        })?;
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io(e, "read configuration", path))?;
        Self::deserialize(&data, format).map_err(|message| Error::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Write the configuration, choosing the format by extension.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let config_error = |message: String| Error::Config {
            path: path.to_path_buf(),
            message,
        };
        let format = ConfigFormat::from_path(path)
            .ok_or_else(|| config_error("unsupported configuration format".to_string()))?;
        let data = self.serialize(format).map_err(config_error)?;
        tokio::fs::write(path, data)
            .await
            .map_err(|e| Error::io(e, "write configuration", path))
    }
}

#[cfg(test)]
mod tests;
