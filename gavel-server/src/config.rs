use gavel_judge::ExecutorConfig;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

#[derive(Debug, Clone, Default, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[validate]
    pub server: ServerConfig,

    pub executor: ExecutorConfig,

    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub port: String,

    #[validate(length(min = 1))]
    pub token: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: "25000".to_owned(),
            token: "secret-token".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub store_dir: PathBuf,
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("./storage/files"),
            db_path: PathBuf::from("./storage/metadata.json"),
        }
    }
}

impl Config {
    /// Read `config.yaml`; a missing file or missing keys fall back to the
    /// documented defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            info!("config file {} not found, using defaults", path.display());
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Config> {
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
