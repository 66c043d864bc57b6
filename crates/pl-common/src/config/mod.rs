//! Configuration loading and validation for Predlock.
//!
//! This module provides:
//! - Typed configuration for risk scoring and process classification
//! - Deterministic config resolution (CLI > env > XDG > defaults)
//! - Semantic validation

pub mod classify;
pub mod resolve;
pub mod risk;

pub use classify::ClassificationRules;
pub use resolve::{ConfigPaths, ConfigResolver};
pub use risk::{Bucket, BucketTable, FactorBuckets, RiskConfig, StatusTable};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// On-disk shape of `config.json`. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub risk: RiskConfig,
    pub classification: ClassificationRules,
}

impl ConfigFile {
    pub fn validate(&self) -> Result<()> {
        self.risk.validate()?;
        self.classification.validate()?;
        Ok(())
    }
}

/// The complete loaded configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Risk weights, level boundaries, and bucket tables
    pub risk: RiskConfig,
    /// Critical/system classification rules
    pub classification: ClassificationRules,
    /// Metadata about how this config was loaded
    pub source: ConfigSource,
}

impl Config {
    /// Load configuration with resolution from CLI, env, or defaults.
    pub fn load(resolver: &ConfigResolver) -> Result<Self> {
        let (file, source) = resolver.load()?;
        Ok(Config {
            risk: file.risk,
            classification: file.classification,
            source,
        })
    }

    /// Load configuration with built-in defaults only.
    pub fn load_defaults() -> Self {
        Config {
            risk: RiskConfig::default(),
            classification: ClassificationRules::default(),
            source: ConfigSource::defaults(),
        }
    }

    /// Validate configuration semantically.
    pub fn validate(&self) -> Result<()> {
        self.risk.validate()?;
        self.classification.validate()?;
        Ok(())
    }
}

/// Configuration source for a file.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSource {
    /// Path to the config file, or None if using defaults
    pub path: Option<String>,
    /// SHA-256 hash of file contents, or None if defaults
    pub hash: Option<String>,
    /// How this source was resolved
    pub resolution: ConfigResolution,
}

impl ConfigSource {
    pub fn defaults() -> Self {
        ConfigSource {
            path: None,
            hash: None,
            resolution: ConfigResolution::Default,
        }
    }
}

/// How a config file was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigResolution {
    /// From explicit CLI flag
    CliFlag,
    /// From environment variable
    EnvVar,
    /// From XDG config directory
    XdgConfig,
    /// Using built-in defaults
    Default,
}

impl std::fmt::Display for ConfigResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigResolution::CliFlag => write!(f, "cli"),
            ConfigResolution::EnvVar => write!(f, "env"),
            ConfigResolution::XdgConfig => write!(f, "xdg"),
            ConfigResolution::Default => write!(f, "default"),
        }
    }
}
