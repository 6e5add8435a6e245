//! Runtime configuration
//!
//! Layered as: built-in defaults, then the TOML config file, then `.env`,
//! then `PRICING_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Upload size limit applied when none is configured
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// SQLite connection URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Directory uploaded files are stored under
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// env_logger filter; `RUST_LOG` wins when set
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_database_url() -> String {
    "sqlite://pricing-ingest.db".to_string()
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_max_upload_bytes() -> usize {
    DEFAULT_MAX_UPLOAD_BYTES
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            storage_dir: default_storage_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            log_level: None,
        }
    }
}

impl IngestConfig {
    /// `~/.config/pricing-ingest/config.toml` or the platform equivalent
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pricing-ingest").join("config.toml"))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load every layer
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path().filter(|p| p.exists()) {
                Some(default_path) => {
                    debug!("Loading config from {}", default_path.display());
                    Self::from_file(default_path)?
                }
                None => Self::default(),
            },
        };

        if let Ok(env_file) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", env_file.display());
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `PRICING_*` overrides from a variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("PRICING_DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(dir) = lookup("PRICING_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(limit) = lookup("PRICING_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = limit
                .trim()
                .parse()
                .with_context(|| format!("Invalid PRICING_MAX_UPLOAD_BYTES '{}'", limit))?;
        }
        if let Some(level) = lookup("PRICING_LOG_LEVEL") {
            self.log_level = Some(level);
        }
        Ok(())
    }
}
