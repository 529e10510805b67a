//! Configuration loading and management
//!
//! Handles parsing of `taskboard.toml` configuration files.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::assign::AssignmentPolicy;
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;
use crate::storage::{DataDir, DEFAULT_NAMESPACE};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Assignment rules
    #[serde(default)]
    pub assignment: AssignmentConfig,

    /// Session gating
    #[serde(default)]
    pub session: SessionConfig,

    /// Accepted login credentials
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Storage-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory (under the data dir) holding persistent keys
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Seed demo tasks and users when nothing is stored yet
    #[serde(default = "default_true")]
    pub seed_demo_data: bool,

    /// How long to wait for a per-key file lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            seed_demo_data: true,
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentConfig {
    /// `strict` or `in_progress_only`
    #[serde(default)]
    pub policy: AssignmentPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Refuse board commands without a login
    #[serde(default = "default_true")]
    pub require_login: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            require_login: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_credentials")]
    pub credentials: Vec<Credential>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials: default_credentials(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

fn default_credentials() -> Vec<Credential> {
    vec![Credential {
        username: "admin".to_string(),
        password: "admin".to_string(),
    }]
}

impl AuthConfig {
    /// True when some credential matches exactly
    pub fn accepts(&self, username: &str, password: &str) -> bool {
        self.credentials
            .iter()
            .any(|cred| cred.username == username && cred.password == password)
    }
}

impl Config {
    /// Load configuration from a `taskboard.toml` file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the data directory, or return defaults
    pub fn load_from_dir(data_dir: &DataDir) -> Self {
        let config_path = data_dir.config_file();
        if !config_path.exists() {
            return Self::default();
        }
        match Self::load(&config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(path = %config_path.display(), error = %err, "ignoring invalid config");
                Self::default()
            }
        }
    }

    /// An explicit path must load; otherwise fall back to the data directory.
    pub fn resolve(explicit: Option<&Path>, data_dir: &DataDir) -> crate::error::Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::load_from_dir(data_dir)),
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> crate::error::Result<()> {
        self.storage.validate()?;
        self.auth.validate()?;
        Ok(())
    }
}

impl StorageConfig {
    fn validate(&self) -> crate::error::Result<()> {
        let namespace = self.namespace.trim();
        if namespace.is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "storage.namespace cannot be empty".to_string(),
            ));
        }
        if !namespace
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            return Err(crate::error::Error::InvalidConfig(format!(
                "storage.namespace '{namespace}' must be alphanumeric, '-' or '_'"
            )));
        }
        if namespace == crate::storage::SESSION_DIR {
            return Err(crate::error::Error::InvalidConfig(
                "storage.namespace cannot be the session directory".to_string(),
            ));
        }
        Ok(())
    }
}

impl AuthConfig {
    fn validate(&self) -> crate::error::Result<()> {
        if self.credentials.is_empty() {
            return Err(crate::error::Error::InvalidConfig(
                "auth.credentials cannot be empty".to_string(),
            ));
        }
        for cred in &self.credentials {
            if cred.username.is_empty() || cred.password.is_empty() {
                return Err(crate::error::Error::InvalidConfig(
                    "auth.credentials entries need a username and a password".to_string(),
                ));
            }
        }
        Ok(())
    }
}
