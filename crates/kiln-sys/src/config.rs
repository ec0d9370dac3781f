//! System configuration (kiln.toml)
//!
//! Every field is optional in the file. Environment variables override the
//! file: `KILN_HOST`, `KILN_MAX_WORKERS`, `KILN_WORKER_PROGRAM` and
//! `KILN_CDN_URL`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::host::HostKind;

/// Configuration file name looked up by [`SystemConfig::load`].
pub const CONFIG_FILE: &str = "kiln.toml";

/// Default CDN for remote module loads.
pub const DEFAULT_CDN_URL: &str = "https://cdn.jsdelivr.net/npm";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A value is out of range or malformed
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// An environment override could not be parsed
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },
}

/// Override for one remotely loadable dependency
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct DependencyConfig {
    /// Version pinned in remote URLs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Entry file inside the package
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
}

/// Compiler system configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct SystemConfig {
    /// Host flavor
    pub host: HostKind,

    /// Worker ceiling; defaults to logical CPUs minus one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,

    /// Worker executable for process workers; thread workers when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_program: Option<PathBuf>,

    /// Extra arguments passed to the worker executable
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub worker_args: Vec<String>,

    /// CDN base used to build remote module URLs
    pub cdn_url: String,

    /// Per-dependency overrides keyed by module id
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, DependencyConfig>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            host: HostKind::default(),
            max_workers: None,
            worker_program: None,
            worker_args: Vec::new(),
            cdn_url: DEFAULT_CDN_URL.to_string(),
            dependencies: BTreeMap::new(),
        }
    }
}

impl SystemConfig {
    /// Parse configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `kiln.toml` from `dir` if present, then apply environment overrides.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        let config = if path.is_file() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env()
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|var| std::env::var(var).ok())
    }

    /// Apply overrides using `lookup` in place of the process environment.
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("KILN_HOST") {
            self.host = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "KILN_HOST",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("KILN_MAX_WORKERS") {
            let parsed = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "KILN_MAX_WORKERS",
                value: value.clone(),
            })?;
            self.max_workers = Some(parsed);
        }
        if let Some(value) = lookup("KILN_WORKER_PROGRAM") {
            self.worker_program = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        if let Some(value) = lookup("KILN_CDN_URL") {
            self.cdn_url = value;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == Some(0) {
            return Err(ConfigError::ValidationError(
                "max-workers must be at least 1".to_string(),
            ));
        }

        let cdn = url::Url::parse(&self.cdn_url).map_err(|e| {
            ConfigError::ValidationError(format!("cdn-url {}: {}", self.cdn_url, e))
        })?;
        if !matches!(cdn.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "cdn-url must be http or https: {}",
                self.cdn_url
            )));
        }

        if self.worker_program.is_some() && !self.host.supports_process_workers() {
            return Err(ConfigError::ValidationError(format!(
                "worker-program is not supported on host {}",
                self.host
            )));
        }
        Ok(())
    }

    /// Worker ceiling after defaults are applied.
    pub fn effective_max_workers(&self) -> usize {
        self.max_workers
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }
}
