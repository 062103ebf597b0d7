//! Configuration handling for adboard
//!
//! Configuration is stored in `.adboard/config.toml` (project) and the
//! platform config directory, e.g. `~/.config/adboard/config.toml` (global).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::UserId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Project-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Acting user for this project
    pub user: Option<String>,

    /// Expiration applied when an ad is published without one
    pub default_expiration_days: Option<u32>,

    /// Window for `ad expiring` (default 7)
    pub expiring_soon_days: u32,

    /// Window for `ad recent` (default 7)
    pub recent_days: u32,

    /// Log filter used when neither `--verbose` nor `ADBOARD_LOG` is set
    pub log_level: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            user: None,
            default_expiration_days: None,
            expiring_soon_days: 7,
            recent_days: 7,
            log_level: "warn".to_string(),
        }
    }
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,

    /// Acting user when the project does not name one
    pub user: Option<String>,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    pub project_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from default locations
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let project_root = Self::find_project_root();
        let project = match &project_root {
            Some(root) => Self::load_project_config(root)?,
            None => ProjectConfig::default(),
        };

        Ok(Self {
            project,
            global,
            project_root,
        })
    }

    /// Loads configuration for a specific project
    pub fn for_project(project_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project_config(project_root)?;

        Ok(Self {
            project,
            global,
            project_root: Some(project_root.to_path_buf()),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "adboard", "adboard").map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
        let config_path = project_root.join(".adboard").join("config.toml");

        if !config_path.exists() {
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse project config")?;

        config.validate()?;
        Ok(config)
    }

    /// Finds the project root from the current directory
    pub fn find_project_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        Self::find_project_root_from(&current)
    }

    /// Finds the nearest ancestor of `start` containing `.adboard/`
    pub fn find_project_root_from(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            if current.join(".adboard").is_dir() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Returns true if we're in an adboard project
    pub fn is_in_project(&self) -> bool {
        self.project_root.is_some()
    }

    /// Returns the project root, or an error if not in a project
    pub fn require_project_root(&self) -> Result<&Path> {
        self.project_root
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Not in an adboard project. Run 'adboard init' first."))
    }

    /// Resolves the acting user.
    ///
    /// Order: project config, global config, `$ADBOARD_USER`, `$USER`,
    /// then `anonymous`.
    pub fn effective_user(&self) -> Result<UserId> {
        let name = self
            .project
            .user
            .clone()
            .or_else(|| self.global.user.clone())
            .or_else(|| std::env::var("ADBOARD_USER").ok())
            .or_else(|| std::env::var("USER").ok())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "anonymous".to_string());

        UserId::new(&name).with_context(|| format!("Invalid user name: {:?}", name))
    }

    /// Saves the project configuration
    pub fn save_project(&self) -> Result<()> {
        let root = self.require_project_root()?;
        let config_path = root.join(".adboard").join("config.toml");

        let content =
            toml::to_string_pretty(&self.project).context("Failed to serialize project config")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write project config: {}", config_path.display()))
    }
}

/// Upper bound for every day-count setting (about a century)
const MAX_DAYS: u32 = 36_500;

impl ProjectConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_expiration_days == Some(0) {
            return Err(ConfigError::Invalid(
                "default_expiration_days must be at least 1".to_string(),
            ));
        }
        if self.expiring_soon_days == 0 || self.recent_days == 0 {
            return Err(ConfigError::Invalid(
                "expiring_soon_days and recent_days must be at least 1".to_string(),
            ));
        }
        let longest = [
            self.default_expiration_days.unwrap_or(1),
            self.expiring_soon_days,
            self.recent_days,
        ];
        if longest.iter().any(|days| *days > MAX_DAYS) {
            return Err(ConfigError::Invalid(format!(
                "day settings must be at most {MAX_DAYS}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_with(project: ProjectConfig) -> Config {
        Config {
            project,
            global: GlobalConfig::default(),
            project_root: None,
        }
    }

    #[test]
    fn default_config() {
        let config = config_with(ProjectConfig::default());

        assert_eq!(config.project.expiring_soon_days, 7);
        assert_eq!(config.project.recent_days, 7);
        assert_eq!(config.project.log_level, "warn");
        assert_eq!(config.project.default_expiration_days, None);
        assert_eq!(config.global.default_format, OutputFormat::Text);
    }

    #[test]
    fn parse_project_config() {
        let toml = r#"
user = "alice"
default_expiration_days = 30
recent_days = 3
"#;

        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.user.as_deref(), Some("alice"));
        assert_eq!(config.default_expiration_days, Some(30));
        assert_eq!(config.recent_days, 3);
        // Unset keys keep their defaults
        assert_eq!(config.expiring_soon_days, 7);
    }

    #[test]
    fn parse_global_config() {
        let toml = r#"
default_format = "json"
user = "bob"
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.default_format, OutputFormat::Json);
        assert_eq!(config.user, Some("bob".to_string()));
    }

    #[test]
    fn zero_expiration_rejected() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".adboard")).unwrap();
        fs::write(
            dir.path().join(".adboard").join("config.toml"),
            "default_expiration_days = 0\n",
        )
        .unwrap();

        assert!(Config::for_project(dir.path()).is_err());
    }

    #[test]
    fn oversized_day_settings_rejected() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".adboard")).unwrap();
        let path = dir.path().join(".adboard").join("config.toml");

        fs::write(&path, "default_expiration_days = 4294967295\n").unwrap();
        assert!(Config::for_project(dir.path()).is_err());

        fs::write(&path, "recent_days = 36501\n").unwrap();
        assert!(Config::for_project(dir.path()).is_err());

        fs::write(&path, "expiring_soon_days = 36500\n").unwrap();
        assert!(Config::for_project(dir.path()).is_ok());
    }

    #[test]
    fn find_project_root() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".adboard")).unwrap();

        let sub_dir = dir.path().join("sub").join("dir");
        fs::create_dir_all(&sub_dir).unwrap();

        let root = Config::find_project_root_from(&sub_dir);
        assert_eq!(root.as_deref(), Some(dir.path()));
    }

    #[test]
    fn config_not_in_project() {
        let config = config_with(ProjectConfig::default());

        assert!(!config.is_in_project());
        assert!(config.require_project_root().is_err());
    }

    #[test]
    fn project_user_wins() {
        let mut global = GlobalConfig::default();
        global.user = Some("global-user".to_string());
        let config = Config {
            project: ProjectConfig {
                user: Some("project-user".to_string()),
                ..ProjectConfig::default()
            },
            global,
            project_root: None,
        };

        assert_eq!(config.effective_user().unwrap().as_str(), "project-user");
    }

    #[test]
    fn save_and_reload_project_config() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".adboard")).unwrap();

        let mut config = Config::for_project(dir.path()).unwrap();
        config.project.default_expiration_days = Some(14);
        config.save_project().unwrap();

        let reloaded = Config::for_project(dir.path()).unwrap();
        assert_eq!(reloaded.project, config.project);
    }
}
