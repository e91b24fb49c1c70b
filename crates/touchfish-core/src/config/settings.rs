use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use super::Directories;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Extra directories scanned for recipe bundles, after the user recipe directory
    #[serde(default)]
    pub recipe_directories: Vec<PathBuf>,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub actions: ActionConfig,
}

impl Config {
    /// Load config from file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, "config.json");
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load config, never failing.
    ///
    /// A missing file is created with the defaults. An unreadable or invalid
    /// file is logged and the defaults are used without touching the file.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            let config = Self::default();
            match config.save(path) {
                Ok(()) => info!("Wrote default config to {}", path.display()),
                Err(e) => error!("Failed to write default config {}: {}", path.display(), e),
            }
            return config;
        }

        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!(
                    "Failed to read config {}, using defaults: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save config to file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// All directories to scan for recipes: the user recipe directory first,
    /// then configured ones, without duplicates.
    #[must_use]
    pub fn recipe_search_path(&self, dirs: &Directories) -> Vec<PathBuf> {
        let mut paths = vec![dirs.user_recipes.clone()];
        for dir in &self.recipe_directories {
            if !paths.contains(dir) {
                paths.push(dir.clone());
            }
        }
        paths
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfig {
    /// Upper bound for a single recipe invocation
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Recipe stdout beyond this size is rejected as malformed
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_timeout_ms() -> u64 {
    3000
}
fn default_max_output_bytes() -> usize {
    1024 * 1024
}

impl ExecutionConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionConfig {
    /// Application used by `open` actions; `None` uses the system default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
}
