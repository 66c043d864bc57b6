//! Error types for Predlock.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 11,
//!   "category": "ledger",
//!   "message": "2 of R1 exceeds capacity (1 of 1 available)",
//!   "recoverable": false,
//!   "context": { "resource": "R1", "amount": 2 }
//! }
//! ```
//!
//! Every ledger mutator either fully applies or fully rejects, so an error
//! never implies a partially updated graph.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for Predlock operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Resource ledger mutation errors.
    Ledger,
    /// Risk and classification configuration errors.
    Config,
    /// Recovery application and host capability errors.
    Host,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Ledger => write!(f, "ledger"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Host => write!(f, "host"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// The two node kinds of a resource-allocation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Process,
    Resource,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Process => write!(f, "process"),
            EntityKind::Resource => write!(f, "resource"),
        }
    }
}

/// Unified error type for Predlock.
#[derive(Error, Debug)]
pub enum Error {
    // Ledger errors (10-19)
    #[error("unknown {kind} {id}")]
    UnknownEntity { kind: EntityKind, id: String },

    #[error("{amount} of {resource} exceeds capacity ({available} of {total} available)")]
    CapacityExceeded {
        resource: String,
        amount: u64,
        available: u32,
        total: u32,
    },

    #[error("amount must be positive, got {amount}")]
    NonPositiveAmount { amount: i64 },

    #[error("{kind} {id} already exists")]
    DuplicateEntity { kind: EntityKind, id: String },

    #[error("resource {resource} still has {edges} outstanding edge(s)")]
    ResourceInUse { resource: String, edges: usize },

    #[error("cannot release {amount} of {resource} from {process}: only {held} held")]
    OverRelease {
        process: String,
        resource: String,
        held: u32,
        amount: u32,
    },

    // Configuration errors (20-29)
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("configuration error: {0}")]
    Config(String),

    // Host errors (30-39)
    #[error("process {process} is critical and cannot be terminated")]
    ProtectedProcess { process: String },

    #[error("host capability failed: {0}")]
    Host(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an unknown process reference.
    pub fn unknown_process(id: impl Into<String>) -> Self {
        Error::UnknownEntity {
            kind: EntityKind::Process,
            id: id.into(),
        }
    }

    /// Shorthand for an unknown resource reference.
    pub fn unknown_resource(id: impl Into<String>) -> Self {
        Error::UnknownEntity {
            kind: EntityKind::Resource,
            id: id.into(),
        }
    }

    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Ledger errors
    /// - 20-29: Configuration errors
    /// - 30-39: Host errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::UnknownEntity { .. } => 10,
            Error::CapacityExceeded { .. } => 11,
            Error::NonPositiveAmount { .. } => 12,
            Error::DuplicateEntity { .. } => 13,
            Error::ResourceInUse { .. } => 14,
            Error::OverRelease { .. } => 15,
            Error::InvalidConfiguration(_) => 20,
            Error::Config(_) => 21,
            Error::ProtectedProcess { .. } => 30,
            Error::Host(_) => 31,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnknownEntity { .. }
            | Error::CapacityExceeded { .. }
            | Error::NonPositiveAmount { .. }
            | Error::DuplicateEntity { .. }
            | Error::ResourceInUse { .. }
            | Error::OverRelease { .. } => ErrorCategory::Ledger,

            Error::InvalidConfiguration(_) | Error::Config(_) => ErrorCategory::Config,

            Error::ProtectedProcess { .. } | Error::Host(_) => ErrorCategory::Host,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error is potentially recoverable.
    ///
    /// Ledger rejections are final for the attempted mutation; the caller
    /// must change its input rather than retry.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::UnknownEntity { .. } => false,
            Error::CapacityExceeded { .. } => false,
            Error::NonPositiveAmount { .. } => false,
            Error::DuplicateEntity { .. } => false,
            // Becomes removable once its edges are released
            Error::ResourceInUse { .. } => true,
            Error::OverRelease { .. } => false,

            // The engine keeps the last valid configuration
            Error::InvalidConfiguration(_) => true,
            Error::Config(_) => true,

            Error::ProtectedProcess { .. } => false,
            Error::Host(_) => true,

            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::UnknownEntity { .. } => "Unknown Entity",
            Error::CapacityExceeded { .. } => "Capacity Exceeded",
            Error::NonPositiveAmount { .. } => "Non-Positive Amount",
            Error::DuplicateEntity { .. } => "Duplicate Entity",
            Error::ResourceInUse { .. } => "Resource In Use",
            Error::OverRelease { .. } => "Release Exceeds Holding",
            Error::InvalidConfiguration(_) => "Invalid Configuration",
            Error::Config(_) => "Configuration Error",
            Error::ProtectedProcess { .. } => "Protected Process",
            Error::Host(_) => "Host Capability Error",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g., resource id, amount).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::UnknownEntity { kind, id } | Error::DuplicateEntity { kind, id } => {
                context.insert("kind".to_string(), serde_json::json!(kind));
                context.insert("id".to_string(), serde_json::json!(id));
            }
            Error::CapacityExceeded {
                resource,
                amount,
                available,
                total,
            } => {
                context.insert("resource".to_string(), serde_json::json!(resource));
                context.insert("amount".to_string(), serde_json::json!(amount));
                context.insert("available".to_string(), serde_json::json!(available));
                context.insert("total".to_string(), serde_json::json!(total));
            }
            Error::NonPositiveAmount { amount } => {
                context.insert("amount".to_string(), serde_json::json!(amount));
            }
            Error::ResourceInUse { resource, edges } => {
                context.insert("resource".to_string(), serde_json::json!(resource));
                context.insert("edges".to_string(), serde_json::json!(edges));
            }
            Error::OverRelease {
                process,
                resource,
                held,
                amount,
            } => {
                context.insert("process".to_string(), serde_json::json!(process));
                context.insert("resource".to_string(), serde_json::json!(resource));
                context.insert("held".to_string(), serde_json::json!(held));
                context.insert("amount".to_string(), serde_json::json!(amount));
            }
            Error::ProtectedProcess { process } => {
                context.insert("process".to_string(), serde_json::json!(process));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}
