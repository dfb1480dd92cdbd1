//! Configuration for the session store and CLI

use crate::session::{DEFAULT_NAMESPACE, DEFAULT_PRIVILEGES};
use crate::store::{FileStore, MemoryStore, PersistenceStore, StoreError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the session record is persisted
    #[serde(default)]
    pub store: StoreConfig,

    /// Namespace the four session keys are stored under
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Privileges granted by `login` when none are given
    #[serde(default = "default_privileges")]
    pub default_privileges: String,

    /// Log level filter string.
    /// Set via config file or USER_SESSION_LOG_LEVEL env var. Overridden by RUST_LOG.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Store backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// JSON document per namespace under `path`
    File {
        /// Directory holding the namespace documents
        path: PathBuf,
    },

    /// Process memory only; nothing survives a restart
    Memory,
}

// Default value functions for serde
fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_privileges() -> String {
    DEFAULT_PRIVILEGES.to_string()
}

fn default_log_level() -> String {
    "user_session=info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            path: PathBuf::from("./session-data"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            namespace: default_namespace(),
            default_privileges: default_privileges(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if std::env::var("USER_SESSION_STORE").is_ok_and(|v| v.eq_ignore_ascii_case("memory")) {
            config.store = StoreConfig::Memory;
        } else if let Ok(dir) = std::env::var("USER_SESSION_DATA_DIR") {
            config.store = StoreConfig::File {
                path: PathBuf::from(dir),
            };
        }

        if let Ok(namespace) = std::env::var("USER_SESSION_NAMESPACE") {
            config.namespace = namespace;
        }

        if let Ok(privileges) = std::env::var("USER_SESSION_DEFAULT_PRIVILEGES") {
            config.default_privileges = privileges;
        }

        if let Ok(level) = std::env::var("USER_SESSION_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("USER_SESSION_CONFIG") {
            if let Ok(config) = Self::from_file(&path) {
                return config;
            }
        }

        let path = "user_session.toml";
        if std::path::Path::new(path).exists() {
            if let Ok(config) = Self::from_file(path) {
                return config;
            }
        }

        Self::from_env()
    }

    /// Build the configured store.
    pub fn open_store(&self) -> Result<Box<dyn PersistenceStore>, StoreError> {
        let store: Box<dyn PersistenceStore> = match &self.store {
            StoreConfig::File { path } => {
                Box::new(FileStore::open(path.clone(), self.namespace.clone())?)
            }
            StoreConfig::Memory => Box::new(MemoryStore::new(self.namespace.clone())),
        };
        Ok(store)
    }

    /// Serialize config to TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
