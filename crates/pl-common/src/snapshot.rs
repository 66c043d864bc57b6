//! Live process attribute snapshots.
//!
//! Snapshots arrive from an external monitoring collaborator on its own
//! cadence. They are plain data: the risk scorer and the classifier read
//! them, nothing in this workspace mutates them.

use serde::{Deserialize, Serialize};

use crate::categories::ProcessStatus;
use crate::id::ProcessId;

/// One point of a process's recent activity history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivitySample {
    /// CPU usage over the sample interval (0-100 per core).
    pub cpu_percent: f64,
}

/// Attributes of a single process at one instant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    /// Ledger identifier, or the stringified pid for live processes.
    pub id: ProcessId,

    /// Executable name as reported by the host (e.g. `lsass.exe`).
    #[serde(default)]
    pub name: String,

    /// Owning user, when visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Executable path, when visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exe: Option<String>,

    #[serde(default)]
    pub status: ProcessStatus,

    #[serde(default)]
    pub thread_count: u32,

    #[serde(default)]
    pub cpu_percent: f64,

    #[serde(default)]
    pub memory_bytes: u64,

    /// Share of physical memory, when the host reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f64>,

    /// Open files, sockets, and other handles.
    #[serde(default)]
    pub open_handles: u32,

    /// Oldest first.
    #[serde(default)]
    pub samples: Vec<ActivitySample>,
}

impl ProcessSnapshot {
    /// Minimal snapshot for a ledger process with no live attributes.
    pub fn new(id: impl Into<ProcessId>) -> Self {
        ProcessSnapshot {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Coefficient of variation of the CPU sample history, capped at 1.0.
    ///
    /// Zero when fewer than two samples exist or the process never used CPU.
    /// A steady process scores near zero; one that alternates between
    /// bursts and stalls scores high.
    pub fn activity_irregularity(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let n = self.samples.len() as f64;
        let mean = self.samples.iter().map(|s| s.cpu_percent).sum::<f64>() / n;
        if mean <= f64::EPSILON {
            return 0.0;
        }
        let variance = self
            .samples
            .iter()
            .map(|s| (s.cpu_percent - mean).powi(2))
            .sum::<f64>()
            / n;
        (variance.sqrt() / mean).min(1.0)
    }
}
