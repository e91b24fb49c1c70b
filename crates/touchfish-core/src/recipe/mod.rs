//! Recipe discovery and the registry of installed recipes.
//!
//! A discovery pass builds a fresh immutable [`RecipeSet`]; the registry
//! swaps it in atomically, so executions that already hold an
//! `Arc<RecipeManifest>` keep using the snapshot they started with.

mod manifest;

pub use manifest::{Invocation, ManifestFile, QUERY_PLACEHOLDER, QueryMode, RecipeManifest};

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use touchfish_types::RecipeSummary;
use tracing::{debug, info, warn};

/// A recipe directory or bundle that was skipped during discovery
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("cannot read recipe directory {}: {source}", .path.display())]
    UnreadableDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no {} in {}", manifest::MANIFEST_FILENAME, .path.display())]
    MissingManifest { path: PathBuf },

    #[error("malformed manifest {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("invalid recipe at {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("duplicate bundleId '{bundle_id}' at {}", .path.display())]
    DuplicateBundleId { bundle_id: String, path: PathBuf },

    #[error("duplicate recipe id '{id}' at {}", .path.display())]
    DuplicateId { id: String, path: PathBuf },
}

/// Immutable set of recipes produced by one discovery pass, in discovery order
#[derive(Debug, Default, Clone)]
pub struct RecipeSet {
    recipes: Vec<Arc<RecipeManifest>>,
    by_id: HashMap<String, usize>,
}

impl RecipeSet {
    /// Build a set from already-loaded manifests.
    ///
    /// Later duplicates (by id or bundle id) are dropped and returned alongside the set.
    pub fn from_manifests(
        manifests: impl IntoIterator<Item = RecipeManifest>,
    ) -> (Self, Vec<DiscoveryError>) {
        let mut set = Self::default();
        let mut errors = Vec::new();
        let mut bundle_ids = HashSet::new();

        for manifest in manifests {
            if set.by_id.contains_key(&manifest.id) {
                errors.push(DiscoveryError::DuplicateId {
                    id: manifest.id.clone(),
                    path: manifest.path.clone(),
                });
                continue;
            }
            if !bundle_ids.insert(manifest.bundle_id.clone()) {
                errors.push(DiscoveryError::DuplicateBundleId {
                    bundle_id: manifest.bundle_id.clone(),
                    path: manifest.path.clone(),
                });
                continue;
            }
            set.by_id.insert(manifest.id.clone(), set.recipes.len());
            set.recipes.push(Arc::new(manifest));
        }

        (set, errors)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<RecipeManifest>> {
        self.by_id.get(id).map(|&idx| &self.recipes[idx])
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RecipeManifest>> {
        self.recipes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.recipes.iter().map(|r| r.id.as_str()).collect()
    }

    /// Entries for the top-level chooser
    #[must_use]
    pub fn summaries(&self) -> Vec<RecipeSummary> {
        self.recipes.iter().map(|r| r.summary()).collect()
    }
}

/// Outcome of a discovery pass
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub recipes: RecipeSet,
    pub errors: Vec<DiscoveryError>,
}

/// Scan `directories` for recipe bundles.
///
/// Never fails as a whole: unreadable directories and bad bundles are logged,
/// recorded in the report, and skipped. Bundles are visited in path order so
/// the first of two duplicates wins deterministically.
pub fn discover(directories: &[PathBuf]) -> DiscoveryReport {
    let mut manifests = Vec::new();
    let mut errors = Vec::new();

    for dir in directories {
        match bundle_dirs(dir) {
            Ok(bundles) => {
                for bundle in bundles {
                    match RecipeManifest::load(&bundle) {
                        Ok(manifest) => {
                            debug!("Loaded recipe: {} from {}", manifest.id, bundle.display());
                            manifests.push(manifest);
                        }
                        Err(e) => errors.push(e),
                    }
                }
            }
            Err(source) => errors.push(DiscoveryError::UnreadableDirectory {
                path: dir.clone(),
                source,
            }),
        }
    }

    let (recipes, duplicates) = RecipeSet::from_manifests(manifests);
    errors.extend(duplicates);

    for error in &errors {
        warn!("Skipping recipe: {}", error);
    }
    info!("Discovered {} recipes: {:?}", recipes.len(), recipes.ids());

    DiscoveryReport { recipes, errors }
}

fn bundle_dirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut bundles: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    bundles.sort();
    Ok(bundles)
}

/// Result of a recipe rescan
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RecipeDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub updated: Vec<String>,
}

impl RecipeDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// Compute diff between recipe sets
#[must_use]
pub fn diff_recipes(before: &RecipeSet, after: &RecipeSet) -> RecipeDiff {
    let mut diff = RecipeDiff::default();

    for recipe in before.iter() {
        if !after.contains(&recipe.id) {
            diff.removed.push(recipe.id.clone());
        }
    }

    for recipe in after.iter() {
        match before.get(&recipe.id) {
            None => diff.added.push(recipe.id.clone()),
            Some(old) if **old != **recipe => diff.updated.push(recipe.id.clone()),
            _ => {}
        }
    }
    diff.added.sort();
    diff.removed.sort();
    diff.updated.sort();
    diff
}

/// Shared handle to the current recipe snapshot
#[derive(Debug, Default)]
pub struct RecipeRegistry {
    current: RwLock<Arc<RecipeSet>>,
}

impl RecipeRegistry {
    #[must_use]
    pub fn new(set: RecipeSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    /// Discover recipes and build a registry from them.
    #[must_use]
    pub fn load(directories: &[PathBuf]) -> Self {
        Self::new(discover(directories).recipes)
    }

    /// Re-discover and swap the snapshot atomically.
    pub fn rescan(&self, directories: &[PathBuf]) -> RecipeDiff {
        debug!("Rescanning recipes in {:?}", directories);
        self.replace(discover(directories).recipes)
    }

    /// Swap in a new set, returning what changed.
    pub fn replace(&self, set: RecipeSet) -> RecipeDiff {
        let next = Arc::new(set);
        let before = std::mem::replace(&mut *self.current.write(), Arc::clone(&next));
        let diff = diff_recipes(&before, &next);
        if !diff.is_empty() {
            info!(
                "Recipes changed: added {:?}, removed {:?}, updated {:?}",
                diff.added, diff.removed, diff.updated
            );
        }
        diff
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<RecipeSet> {
        Arc::clone(&self.current.read())
    }

    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<Arc<RecipeManifest>> {
        self.current.read().get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.current.read().contains(id)
    }
}
