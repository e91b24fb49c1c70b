use super::DiscoveryError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use touchfish_types::RecipeSummary;

pub(crate) const MANIFEST_FILENAME: &str = "recipe.json";

/// Placeholder replaced with the query string in manifest arguments
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// On-disk recipe manifest (recipe.json)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    /// Defaults to the bundle directory name
    #[serde(default)]
    pub id: Option<String>,

    pub bundle_id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    /// Program to run: absolute, relative to the bundle (`./run.sh`), or a name on `PATH`
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub query_mode: QueryMode,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// How the query string reaches the recipe process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Substituted into `{query}` placeholders, or appended as the last argument
    #[default]
    Argument,
    /// Written to stdin, followed by EOF
    Stdin,
}

/// Resolved invocation descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub query_mode: QueryMode,
    /// Per-recipe override of the configured timeout
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Build the argument vector for one query.
    #[must_use]
    pub fn arguments(&self, query: &str) -> Vec<String> {
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(QUERY_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(QUERY_PLACEHOLDER, query)
                } else {
                    arg.clone()
                }
            })
            .collect();

        if self.query_mode == QueryMode::Argument && !substituted {
            args.push(query.to_string());
        }
        args
    }

    /// Bytes to write to the child's stdin, if any.
    #[must_use]
    pub fn stdin_payload<'a>(&self, query: &'a str) -> Option<&'a [u8]> {
        match self.query_mode {
            QueryMode::Stdin => Some(query.as_bytes()),
            QueryMode::Argument => None,
        }
    }
}

/// An installed recipe. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeManifest {
    pub id: String,
    pub bundle_id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    /// Bundle directory, used as the working directory of the process
    pub path: PathBuf,
    pub invocation: Invocation,
}

impl RecipeManifest {
    /// Load a recipe from a bundle directory.
    ///
    /// # Errors
    ///
    /// Returns a `DiscoveryError` if the manifest is missing, unreadable,
    /// malformed, or describes an unusable invocation.
    pub fn load(path: &Path) -> Result<Self, DiscoveryError> {
        let manifest_path = path.join(MANIFEST_FILENAME);
        if !manifest_path.exists() {
            return Err(DiscoveryError::MissingManifest {
                path: path.to_path_buf(),
            });
        }

        let content =
            std::fs::read_to_string(&manifest_path).map_err(|e| DiscoveryError::Malformed {
                path: manifest_path.clone(),
                reason: e.to_string(),
            })?;
        crate::config::warn_unknown_manifest_fields(&content, &manifest_path.display().to_string());

        let file: ManifestFile =
            serde_json::from_str(&content).map_err(|e| DiscoveryError::Malformed {
                path: manifest_path.clone(),
                reason: e.to_string(),
            })?;

        Self::from_file(file, path)
    }

    /// Resolve a parsed manifest against its bundle directory.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::Invalid` for empty identifiers or commands.
    pub fn from_file(file: ManifestFile, path: &Path) -> Result<Self, DiscoveryError> {
        let invalid = |reason: &str| DiscoveryError::Invalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let id = match file.id {
            Some(id) => id,
            None => path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| invalid("bundle directory name is not valid UTF-8"))?
                .to_string(),
        };
        if id.trim().is_empty() {
            return Err(invalid("empty id"));
        }
        if file.bundle_id.trim().is_empty() {
            return Err(invalid("empty bundleId"));
        }
        if file.command.trim().is_empty() {
            return Err(invalid("empty command"));
        }

        let invocation = Invocation {
            program: resolve_program(&file.command, path),
            args: file.args,
            query_mode: file.query_mode,
            timeout: file.timeout_ms.map(Duration::from_millis),
        };

        Ok(Self {
            name: file.name.unwrap_or_else(|| id.clone()),
            id,
            bundle_id: file.bundle_id,
            description: file.description,
            icon: file.icon,
            path: path.to_path_buf(),
            invocation,
        })
    }

    #[must_use]
    pub fn summary(&self) -> RecipeSummary {
        RecipeSummary {
            id: self.id.clone(),
            bundle_id: self.bundle_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            icon: self.icon.clone(),
        }
    }
}

/// Bare names go through `PATH`; anything with a separator is bundle-relative.
fn resolve_program(command: &str, bundle_dir: &Path) -> PathBuf {
    let command_path = Path::new(command);
    if command_path.is_absolute() {
        command_path.to_path_buf()
    } else if command.contains('/') {
        bundle_dir.join(command_path)
    } else {
        command_path.to_path_buf()
    }
}
