//! Configuration management for tokencache

pub mod schema;

pub use schema::Config;

use crate::error::{CacheError, CacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tokencache")
            .join("config.toml")
    }

    /// Per-user data directory
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tokencache")
    }

    /// Default folder for the cache files
    pub fn default_cache_dir() -> PathBuf {
        Self::data_dir().join("cache")
    }

    /// Default protection key location, outside the cache folder
    pub fn default_key_file() -> PathBuf {
        Self::data_dir().join("protect.key")
    }

    /// Get the audit log path
    pub fn audit_log_path() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tokencache")
            .join("audit.log")
    }

    /// Load configuration, falling back to defaults if missing
    pub async fn load(&self) -> CacheResult<Config> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> CacheResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| CacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> CacheResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            CacheError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> CacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Where one invocation keeps its files, after CLI overrides
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub cache_dir: PathBuf,
    pub key_file: PathBuf,
}

impl ResolvedPaths {
    /// `cache_dir_override` beats the config file, which beats the defaults.
    ///
    /// With an override and no configured key file, the key lives next to
    /// the cache folder so separate folders get separate keys.
    pub fn resolve(config: &Config, cache_dir_override: Option<&Path>) -> Self {
        let cache_dir = cache_dir_override
            .map(Path::to_path_buf)
            .or_else(|| config.cache.folder.clone())
            .unwrap_or_else(ConfigManager::default_cache_dir);

        let key_file = match (&config.cache.key_file, cache_dir_override) {
            (Some(key_file), _) => key_file.clone(),
            (None, Some(dir)) => dir.join(".protect.key"),
            (None, None) => ConfigManager::default_key_file(),
        };

        Self {
            cache_dir,
            key_file,
        }
    }

    /// Paths of the app-token cache, a separate file set under the user
    /// cache folder sharing its key
    pub fn for_app(self) -> Self {
        Self {
            cache_dir: self.cache_dir.join("app"),
            key_file: self.key_file,
        }
    }
}
