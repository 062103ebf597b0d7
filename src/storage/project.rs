//! Project management
//!
//! Handles project initialization and provides access to stores.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

use super::{Cache, CatalogStore, Config};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in an adboard project. Run 'adboard init' first.")]
    NotInProject,
}

const DEFAULT_CONFIG: &str = r#"# adboard configuration

# Acting user (falls back to $ADBOARD_USER, then $USER)
# user = "alice"

# Days until a newly published ad expires when no date is given
# default_expiration_days = 30

# Window for 'adboard ad expiring'
expiring_soon_days = 7

# Window for 'adboard ad recent'
recent_days = 7

# Log level when ADBOARD_LOG is unset (error, warn, info, debug, trace)
log_level = "warn"
"#;

const GITIGNORE: &str = r#"# Ignore SQLite cache (regenerated from the JSONL tables)
.cache/

# Ignore lock and temp files
catalog.lock
*.tmp
"#;

/// An adboard project
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(".adboard").is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path.
    ///
    /// Existing files are left alone, so running it twice is harmless.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let data_dir = root.join(".adboard");

        fs::create_dir_all(&data_dir).with_context(|| {
            format!("Failed to create .adboard directory: {}", data_dir.display())
        })?;

        let config_path = data_dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let gitignore_path = data_dir.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(&gitignore_path, GITIGNORE).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        debug!(root = %root.display(), "project initialized");
        Self::open(root)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .adboard directory path
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(".adboard")
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the catalog store
    pub fn catalog(&self) -> CatalogStore {
        CatalogStore::for_project(&self.root)
    }

    /// Opens the SQLite index for this project
    pub fn cache(&self) -> Result<Cache> {
        Cache::open(&self.root)
    }

    /// Rebuilds the index from the catalog tables
    pub fn rebuild_cache(&self) -> Result<Cache> {
        let mut cache = self.cache()?;
        self.catalog().read(|catalog| Ok(cache.rebuild(catalog)?))?;
        Ok(cache)
    }

    /// Gets the index if it's fresh, or rebuilds it if stale
    pub fn get_or_rebuild_cache(&self) -> Result<Cache> {
        let cache = self.cache()?;

        if cache.is_stale()? {
            debug!("cache is stale, rebuilding");
            drop(cache);
            return self.rebuild_cache();
        }

        Ok(cache)
    }

    /// Deletes the index; it is recreated on next use
    pub fn clear_cache(&self) -> Result<bool> {
        let cache_dir = self.data_dir().join(".cache");
        if !cache_dir.exists() {
            return Ok(false);
        }

        fs::remove_dir_all(&cache_dir)
            .with_context(|| format!("Failed to remove cache: {}", cache_dir.display()))?;
        Ok(true)
    }
}
