//! Multi-factor risk scoring of live process snapshots.
//!
//! # Formula
//!
//! ```text
//! score = clamp(Σ weight_f × bucket_f(value_f), 0, 100)
//! ```
//!
//! over five factors: thread count, status, memory, open handles, and
//! activity-pattern irregularity. Bucket tables and weights come from
//! [`RiskConfig`]; scoring itself is a pure function of the snapshot and
//! the configuration, so it may run concurrently for any number of
//! processes.

use std::sync::{Arc, RwLock};

use pl_common::{ProcessId, ProcessSnapshot, ProcessStatus, Result, RiskConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::logging::{event_names, Stage};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Discrete risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

impl RiskLevel {
    /// Map a score onto a level using the configured boundaries.
    pub fn from_score(score: f64, config: &RiskConfig) -> Self {
        if score < config.low_high_boundary {
            RiskLevel::Low
        } else if score < config.medium_high_boundary {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

/// One scored input, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "factor", content = "value", rename_all = "snake_case")]
pub enum Factor {
    Threads(u32),
    Status(ProcessStatus),
    /// Resident memory in bytes; bucketed in MiB.
    Memory(u64),
    Handles(u32),
    /// Activity irregularity in `[0, 1]`.
    Pattern(f64),
}

impl Factor {
    /// The five factors of a snapshot, in weight order.
    pub fn from_snapshot(snapshot: &ProcessSnapshot) -> [Factor; 5] {
        [
            Factor::Threads(snapshot.thread_count),
            Factor::Status(snapshot.status),
            Factor::Memory(snapshot.memory_bytes),
            Factor::Handles(snapshot.open_handles),
            Factor::Pattern(snapshot.activity_irregularity()),
        ]
    }

    pub fn weight(&self, config: &RiskConfig) -> f64 {
        match self {
            Factor::Threads(_) => config.thread_weight,
            Factor::Status(_) => config.status_weight,
            Factor::Memory(_) => config.memory_weight,
            Factor::Handles(_) => config.handle_weight,
            Factor::Pattern(_) => config.pattern_weight,
        }
    }

    /// Bucket fraction in `[0, 1]`.
    pub fn fraction(&self, config: &RiskConfig) -> f64 {
        let buckets = &config.buckets;
        match *self {
            Factor::Threads(n) => buckets.threads.fraction_for(f64::from(n)),
            Factor::Status(status) => buckets.status.fraction_for(status),
            Factor::Memory(bytes) => buckets.memory_mib.fraction_for(bytes as f64 / BYTES_PER_MIB),
            Factor::Handles(n) => buckets.handles.fraction_for(f64::from(n)),
            Factor::Pattern(v) => buckets.pattern.fraction_for(v),
        }
    }
}

/// Contribution of a single factor to the total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub factor: Factor,
    pub weight: f64,
    pub fraction: f64,
    pub score: f64,
}

/// Derived risk of one process; recomputed on every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
    pub process: ProcessId,
    pub score: f64,
    pub level: RiskLevel,
    pub factors: Vec<FactorScore>,
}

/// Score one snapshot under `config`.
pub fn score_risk(snapshot: &ProcessSnapshot, config: &RiskConfig) -> RiskRecord {
    let factors: Vec<FactorScore> = Factor::from_snapshot(snapshot)
        .into_iter()
        .map(|factor| {
            let weight = factor.weight(config);
            let fraction = factor.fraction(config);
            FactorScore {
                factor,
                weight,
                fraction,
                score: weight * fraction,
            }
        })
        .collect();

    let raw: f64 = factors.iter().map(|f| f.score).sum();
    let score = raw.clamp(0.0, 100.0);
    let level = RiskLevel::from_score(score, config);

    debug!(
        event = event_names::RISK_SCORED,
        stage = %Stage::Score,
        process = %snapshot.id,
        score,
        %level
    );

    RiskRecord {
        process: snapshot.id.clone(),
        score,
        level,
        factors,
    }
}

/// Holds the active risk configuration for a stream of scoring calls.
///
/// Readers clone the `Arc` under a brief read lock and score without any
/// lock held. A rejected reconfiguration leaves the previous one active.
#[derive(Debug, Default)]
pub struct RiskEngine {
    config: RwLock<Arc<RiskConfig>>,
}

impl RiskEngine {
    /// Create an engine, validating the initial configuration.
    pub fn new(config: RiskConfig) -> Result<Self> {
        config.validate()?;
        Ok(RiskEngine {
            config: RwLock::new(Arc::new(config)),
        })
    }

    pub fn config(&self) -> Arc<RiskConfig> {
        let guard = self.config.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a new configuration if it validates.
    pub fn reconfigure(&self, config: RiskConfig) -> Result<()> {
        if let Err(err) = config.validate() {
            warn!(
                event = event_names::CONFIG_REJECTED,
                stage = %Stage::Score,
                %err,
                "keeping previous risk configuration"
            );
            return Err(err);
        }
        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(config);
        info!(event = event_names::CONFIG_LOADED, stage = %Stage::Score, "risk configuration replaced");
        Ok(())
    }

    pub fn score(&self, snapshot: &ProcessSnapshot) -> RiskRecord {
        score_risk(snapshot, &self.config())
    }

    pub fn score_all(&self, snapshots: &[ProcessSnapshot]) -> Vec<RiskRecord> {
        let config = self.config();
        snapshots.iter().map(|s| score_risk(s, &config)).collect()
    }
}
