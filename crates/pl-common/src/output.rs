//! How `pl-core` renders reports on stdout.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Rendering for analysis reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Report wrapped in a JSON envelope
    #[default]
    Json,

    /// The report's one-line message
    Summary,

    /// Markdown tables for humans
    Md,
}

impl OutputFormat {
    /// Whether errors should also be emitted as structured JSON.
    pub fn is_machine_readable(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OutputFormat::Json => "json",
            OutputFormat::Summary => "summary",
            OutputFormat::Md => "md",
        };
        f.write_str(name)
    }
}
