//! Predlock Core Library
//!
//! This library provides deadlock analysis over a resource-allocation graph:
//! - A validated resource ledger (processes, resources, allocations, requests)
//! - Deadlock detection by graph reduction, with cycle extraction
//! - Banker's-algorithm safety checks and what-if evaluation
//! - Weighted risk scoring of live process snapshots
//! - Classification-aware recovery ranking and application
//!
//! The binary entry point is in `main.rs`.

pub mod apply;
pub mod banker;
pub mod classify;
pub mod detect;
pub mod engine;
pub mod exit_codes;
pub mod host;
pub mod ledger;
pub mod logging;
pub mod recovery;
pub mod risk;
pub mod scenario;

pub use apply::{apply_recommendation, RecoveryOutcome, RecoveryState};
pub use banker::{check_safe_state, what_if, SafetyReport};
pub use classify::{ClassificationMap, Classifier};
pub use detect::{detect_deadlock, DeadlockReport, GraphNode};
pub use engine::Engine;
pub use host::{ProcessHost, StaticHost};
pub use ledger::{GraphData, Ledger, SharedLedger};
pub use recovery::{recommend_recovery, RecoveryAction, RecoveryRecommendation};
pub use risk::{score_risk, RiskEngine, RiskLevel, RiskRecord};
pub use scenario::Scenario;
