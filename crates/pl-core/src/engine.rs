//! Query façade over a shared ledger.
//!
//! `Engine` bundles the shared ledger, the active risk configuration, and
//! the compiled classifier, and exposes the query API. Every analysis takes
//! a point-in-time snapshot of the ledger first, so concurrent callers never
//! hold the lock while computing.

use pl_common::{Config, ProcessId, ProcessSnapshot, ResourceId, Result, RiskConfig};
use tracing::info;

use crate::apply::{apply_recommendation, dismiss, RecoveryOutcome};
use crate::banker::{self, SafetyReport};
use crate::classify::{ClassificationMap, Classifier};
use crate::detect::{self, DeadlockReport};
use crate::host::ProcessHost;
use crate::ledger::{GraphData, Ledger, SharedLedger};
use crate::logging::{event_names, Stage};
use crate::recovery::{RecoveryInput, RecoveryRecommendation, RecoverySelector};
use crate::risk::{RiskEngine, RiskRecord};

#[derive(Debug)]
pub struct Engine {
    ledger: SharedLedger,
    risk: RiskEngine,
    classifier: Classifier,
}

impl Engine {
    /// Build an engine over an empty ledger.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_ledger(config, Ledger::new())
    }

    pub fn with_ledger(config: &Config, ledger: Ledger) -> Result<Self> {
        config.validate()?;
        let engine = Engine {
            ledger: SharedLedger::new(ledger),
            risk: RiskEngine::new(config.risk.clone())?,
            classifier: Classifier::new(&config.classification)?,
        };
        info!(
            event = event_names::CONFIG_LOADED,
            stage = %Stage::Init,
            resolution = ?config.source.resolution,
            "engine ready"
        );
        Ok(engine)
    }

    /// Shared handle for mutation from other threads.
    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn mutate<T>(&self, f: impl FnOnce(&mut Ledger) -> Result<T>) -> Result<T> {
        self.ledger.mutate(f)
    }

    pub fn detect_deadlock(&self) -> DeadlockReport {
        detect::detect_deadlock(&self.ledger.snapshot())
    }

    pub fn check_safe_state(&self) -> SafetyReport {
        banker::check_safe_state(&self.ledger.snapshot())
    }

    pub fn what_if(
        &self,
        process: &ProcessId,
        resource: &ResourceId,
        n: u32,
    ) -> Result<SafetyReport> {
        banker::what_if(&self.ledger.snapshot(), process, resource, n)
    }

    pub fn score_risk(&self, snapshot: &ProcessSnapshot) -> RiskRecord {
        self.risk.score(snapshot)
    }

    pub fn score_all(&self, snapshots: &[ProcessSnapshot]) -> Vec<RiskRecord> {
        self.risk.score_all(snapshots)
    }

    /// Keep the previous risk configuration if `config` is invalid.
    pub fn reconfigure_risk(&self, config: RiskConfig) -> Result<()> {
        self.risk.reconfigure(config)
    }

    pub fn classify(&self, snapshots: &[ProcessSnapshot]) -> ClassificationMap {
        self.classifier.classify_all(snapshots)
    }

    pub fn recommend_recovery(&self, classes: &ClassificationMap) -> Vec<RecoveryRecommendation> {
        self.recommend_with(classes, &[])
    }

    /// Like [`Engine::recommend_recovery`], refining impact with live snapshots.
    pub fn recommend_with(
        &self,
        classes: &ClassificationMap,
        snapshots: &[ProcessSnapshot],
    ) -> Vec<RecoveryRecommendation> {
        let ledger = self.ledger.snapshot();
        let report = detect::detect_deadlock(&ledger);
        RecoverySelector::new(&ledger, classes)
            .with_snapshots(snapshots)
            .select(RecoveryInput::Detected(&report))
    }

    /// Recommendation for a risk-flagged process.
    pub fn recommend_for_risk(
        &self,
        record: &RiskRecord,
        classes: &ClassificationMap,
    ) -> Option<RecoveryRecommendation> {
        let ledger = self.ledger.snapshot();
        RecoverySelector::new(&ledger, classes)
            .select(RecoveryInput::Flagged(record))
            .into_iter()
            .next()
    }

    pub fn apply(
        &self,
        rec: &RecoveryRecommendation,
        host: Option<&dyn ProcessHost>,
    ) -> Result<RecoveryOutcome> {
        self.ledger
            .mutate(|ledger| apply_recommendation(ledger, rec, host))
    }

    pub fn dismiss(&self, rec: &RecoveryRecommendation) -> RecoveryOutcome {
        dismiss(rec)
    }

    pub fn graph(&self) -> GraphData {
        self.ledger.snapshot().graph()
    }
}
