//! Configuration resolution for Predlock.
//!
//! Implements deterministic config resolution order:
//! 1. Explicit CLI flag (--config)
//! 2. Environment variable (PREDLOCK_CONFIG)
//! 3. XDG config (`$XDG_CONFIG_HOME/predlock/config.json`, then the platform
//!    config dir)
//! 4. Built-in defaults

use std::env;
use std::fs;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use super::{ConfigFile, ConfigResolution, ConfigSource};
use crate::error::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "PREDLOCK_CONFIG";

const CONFIG_DIR_NAME: &str = "predlock";
const CONFIG_FILE_NAME: &str = "config.json";

/// Configuration file paths.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Explicit path to config.json
    pub config_path: Option<PathBuf>,
}

/// Configuration resolver with deterministic resolution order.
#[derive(Debug)]
pub struct ConfigResolver {
    /// Paths from CLI flags
    cli_paths: ConfigPaths,
}

impl ConfigResolver {
    /// Create a new resolver with CLI paths.
    pub fn new(paths: ConfigPaths) -> Self {
        ConfigResolver { cli_paths: paths }
    }

    /// Create a resolver with no CLI overrides.
    pub fn with_defaults() -> Self {
        ConfigResolver {
            cli_paths: ConfigPaths::default(),
        }
    }

    /// Resolve the config directory path.
    pub fn resolve_config_dir(&self) -> Option<PathBuf> {
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg).join(CONFIG_DIR_NAME));
        }
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME))
    }

    /// Resolve the config.json path.
    pub fn resolve_config_path(&self) -> (Option<PathBuf>, ConfigResolution) {
        // 1. CLI flag
        if let Some(ref path) = self.cli_paths.config_path {
            return (Some(path.clone()), ConfigResolution::CliFlag);
        }

        // 2. PREDLOCK_CONFIG env var
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return (Some(PathBuf::from(path)), ConfigResolution::EnvVar);
        }

        // 3. XDG config dir, only when the file exists
        if let Some(config_dir) = self.resolve_config_dir() {
            let path = config_dir.join(CONFIG_FILE_NAME);
            if path.exists() {
                return (Some(path), ConfigResolution::XdgConfig);
            }
        }

        // 4. Default
        (None, ConfigResolution::Default)
    }

    /// Load and validate the config file from the resolved path or defaults.
    pub fn load(&self) -> Result<(ConfigFile, ConfigSource)> {
        let (path, resolution) = self.resolve_config_path();

        let Some(p) = path else {
            return Ok((ConfigFile::default(), ConfigSource::defaults()));
        };

        let content = fs::read_to_string(&p).map_err(|e| {
            Error::Config(format!("failed to read config from {}: {}", p.display(), e))
        })?;

        let hash = compute_sha256(&content);

        let file: ConfigFile = serde_json::from_str(&content).map_err(|e| {
            Error::InvalidConfiguration(format!("failed to parse {}: {}", p.display(), e))
        })?;

        file.validate()?;

        Ok((
            file,
            ConfigSource {
                path: Some(p.to_string_lossy().to_string()),
                hash: Some(hash),
                resolution,
            },
        ))
    }
}

/// Compute SHA-256 hash of a string.
fn compute_sha256(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
}
