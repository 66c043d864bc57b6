//! Structured event names and pipeline stages for logging.
//!
//! Engine events carry an `event` field from [`event_names`] and a `stage`
//! field from [`Stage`], so JSONL consumers can filter without parsing
//! messages.

use serde::{Deserialize, Serialize};

/// Processing stages in the pl-core pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Initial startup and configuration.
    Init,
    /// Ledger mutation.
    Ledger,
    /// Graph-reduction deadlock detection.
    Detect,
    /// Banker's safety check and what-if evaluation.
    Predict,
    /// Risk scoring of live snapshots.
    Score,
    /// Recovery candidate ranking.
    Recover,
    /// Applying or dismissing a recommendation.
    Apply,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Ledger => "ledger",
            Stage::Detect => "detect",
            Stage::Predict => "predict",
            Stage::Score => "score",
            Stage::Recover => "recover",
            Stage::Apply => "apply",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Ledger
    pub const LEDGER_MUTATED: &str = "ledger.mutated";
    pub const LEDGER_REJECTED: &str = "ledger.rejected";

    // Detect
    pub const DETECT_PASS: &str = "detect.pass";
    pub const DETECT_FINISHED: &str = "detect.finished";

    // Predict
    pub const SAFETY_FINISHED: &str = "safety.finished";
    pub const WHATIF_FINISHED: &str = "whatif.finished";

    // Score
    pub const RISK_SCORED: &str = "risk.scored";

    // Recover / apply
    pub const RECOVERY_RANKED: &str = "recovery.ranked";
    pub const APPLY_FINISHED: &str = "apply.finished";
    pub const APPLY_DISMISSED: &str = "apply.dismissed";

    // Config
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_REJECTED: &str = "config.rejected";

    // Error events
    pub const INTERNAL_ERROR: &str = "internal_error";
}
