//! Predlock common types, IDs, and errors.
//!
//! This crate provides foundational types shared across pl-core modules:
//! - Process and resource identifiers
//! - Process classification and status taxonomies
//! - Live process attribute snapshots
//! - Common error types
//! - Output format specifications
//! - Configuration loading and validation

pub mod categories;
pub mod config;
pub mod error;
pub mod id;
pub mod output;
pub mod snapshot;

pub use categories::{Classification, ProcessStatus};
pub use config::{ClassificationRules, Config, ConfigPaths, ConfigResolver, RiskConfig};
pub use error::{EntityKind, Error, ErrorCategory, Result, StructuredError};
pub use id::{ProcessId, ResourceId};
pub use output::OutputFormat;
pub use snapshot::{ActivitySample, ProcessSnapshot};
