//! Process classification and status taxonomies.
//!
//! Classification gates recovery: a [`Classification::Critical`] process is
//! never offered termination. It is assigned when a process enters the ledger
//! and does not change afterwards; reclassifying means removing and re-adding.

use serde::{Deserialize, Serialize};

/// How important a process is to the host system.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Ordinary user workload (default).
    #[default]
    User,
    /// Host service whose loss degrades the system.
    System,
    /// Host component whose loss can crash the system.
    Critical,
}

impl Classification {
    /// Whether termination may be recommended for this class.
    pub fn is_terminable(&self) -> bool {
        !matches!(self, Classification::Critical)
    }

    /// Base impact contribution used when ranking recovery options.
    pub fn base_impact(&self) -> f64 {
        match self {
            Classification::User => 10.0,
            Classification::System => 50.0,
            Classification::Critical => 100.0,
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::User => write!(f, "user"),
            Classification::System => write!(f, "system"),
            Classification::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Classification::User),
            "system" => Ok(Classification::System),
            "critical" => Ok(Classification::Critical),
            _ => Err(format!("unknown classification: {}", s)),
        }
    }
}

/// Scheduler status reported by the live-process feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Running,
    Sleeping,
    /// Blocked on a lock, pipe, or other event.
    Waiting,
    /// Uninterruptible sleep, usually I/O.
    DiskSleep,
    Stopped,
    Zombie,
    #[default]
    Unknown,
}

impl ProcessStatus {
    pub fn all() -> &'static [ProcessStatus] {
        &[
            ProcessStatus::Running,
            ProcessStatus::Sleeping,
            ProcessStatus::Waiting,
            ProcessStatus::DiskSleep,
            ProcessStatus::Stopped,
            ProcessStatus::Zombie,
            ProcessStatus::Unknown,
        ]
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessStatus::Running => "running",
            ProcessStatus::Sleeping => "sleeping",
            ProcessStatus::Waiting => "waiting",
            ProcessStatus::DiskSleep => "disk_sleep",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Zombie => "zombie",
            ProcessStatus::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
