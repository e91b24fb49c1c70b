use directories::ProjectDirs;
use std::path::PathBuf;

/// Application directories following the XDG base directory layout
#[derive(Debug, Clone)]
pub struct Directories {
    /// Config directory (~/.config/touchfish)
    pub config: PathBuf,

    /// Data directory (~/.local/share/touchfish)
    pub data: PathBuf,

    /// Log directory (~/.local/share/touchfish/log)
    pub log: PathBuf,

    /// User recipes directory (~/.config/touchfish/recipes)
    pub user_recipes: PathBuf,

    /// Config file path
    pub config_file: PathBuf,
}

impl Directories {
    /// Create a new `Directories` instance with standard XDG paths.
    ///
    /// # Panics
    ///
    /// Panics if the system's project directories cannot be determined.
    #[must_use]
    pub fn new() -> Self {
        let project = ProjectDirs::from("", "", "touchfish")
            .expect("Failed to determine project directories");

        let config = project.config_dir().to_path_buf();
        let data = project.data_dir().to_path_buf();

        Self {
            user_recipes: config.join("recipes"),
            config_file: config.join("config.json"),
            log: data.join("log"),
            config,
            data,
        }
    }

    #[must_use]
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            user_recipes: base.join("recipes"),
            config_file: base.join("config.json"),
            log: base.join("log"),
            config: base.clone(),
            data: base,
        }
    }

    /// Ensure all directories exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn ensure_exists(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config)?;
        std::fs::create_dir_all(&self.data)?;
        std::fs::create_dir_all(&self.log)?;
        std::fs::create_dir_all(&self.user_recipes)?;
        Ok(())
    }
}

impl Default for Directories {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_base_sets_all_paths() {
        let base = PathBuf::from("/tmp/test-touchfish");
        let dirs = Directories::with_base(base.clone());

        assert_eq!(dirs.config, base);
        assert_eq!(dirs.data, base);
        assert_eq!(dirs.log, base.join("log"));
        assert_eq!(dirs.user_recipes, base.join("recipes"));
        assert_eq!(dirs.config_file, base.join("config.json"));
    }

    #[test]
    fn test_ensure_exists_creates_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path().join("touchfish-test-subdir");
        let dirs = Directories::with_base(base.clone());

        assert!(!dirs.user_recipes.exists());

        dirs.ensure_exists().unwrap();

        assert!(dirs.config.exists());
        assert!(dirs.data.exists());
        assert!(dirs.log.exists());
        assert!(dirs.user_recipes.exists());
    }

    #[test]
    fn test_ensure_exists_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dirs = Directories::with_base(temp_dir.path().to_path_buf());

        dirs.ensure_exists().unwrap();
        dirs.ensure_exists().unwrap();

        assert!(dirs.config.exists());
    }

    #[test]
    fn test_new_returns_valid_xdg_paths() {
        let dirs = Directories::new();

        assert!(dirs.config.to_string_lossy().contains("touchfish"));
        assert!(dirs.data.to_string_lossy().contains("touchfish"));
        assert!(dirs.config_file.to_string_lossy().ends_with("config.json"));
        assert!(dirs.user_recipes.ends_with("recipes"));
    }
}
