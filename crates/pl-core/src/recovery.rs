//! Recovery recommendation.
//!
//! Turns a deadlock report or a risk record into a ranked list of
//! recommendations. The selector never mutates the ledger: every "what
//! would happen if" question is answered on a private copy, and carrying a
//! recommendation out is the separate, explicit step in [`crate::apply`].
//!
//! # Ranking
//!
//! For each deadlock participant `p` that is not Critical, Terminate and
//! Rollback candidates are scored by leverage:
//!
//! ```text
//! unblocked(p) = |D \ {p}| - |D'|     where D' = deadlock set after removing p
//! ```
//!
//! Candidates sort by `unblocked` descending, then process id ascending,
//! then action (Terminate, Rollback, PreemptResource, Wait).
//!
//! Critical participants are never offered Terminate. They get a
//! PreemptResource recommendation naming a non-Critical holder of a
//! resource they wait on, or Wait when no such holder exists; either way
//! `eligible` is false.

use std::collections::BTreeMap;
use std::fmt;

use pl_common::{Classification, ProcessId, ProcessSnapshot, ResourceId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classify::ClassificationMap;
use crate::detect::{detect_deadlock, DeadlockReport};
use crate::ledger::Ledger;
use crate::logging::{event_names, Stage};
use crate::risk::{RiskLevel, RiskRecord};

/// Corrective actions, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Terminate,
    Rollback,
    PreemptResource,
    Wait,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryAction::Terminate => write!(f, "Terminate"),
            RecoveryAction::Rollback => write!(f, "Rollback"),
            RecoveryAction::PreemptResource => write!(f, "Preempt-Resource"),
            RecoveryAction::Wait => write!(f, "Wait"),
        }
    }
}

/// Instances to take from a holder on behalf of a blocked process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preemption {
    pub from: ProcessId,
    pub resource: ResourceId,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecommendation {
    pub target: ProcessId,
    pub action: RecoveryAction,
    pub classification: Classification,
    /// Deadlock participants expected to become finishable.
    pub estimated_unblocked: usize,
    /// Cost estimate derived from classification.
    pub impact: String,
    /// Lower is better.
    pub impact_score: f64,
    /// False for Critical targets.
    pub eligible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preemption: Option<Preemption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pros: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cons: Vec<String>,
    pub rationale: String,
}

/// Event that prompted a recommendation.
#[derive(Debug, Clone, Copy)]
pub enum RecoveryInput<'a> {
    Detected(&'a DeadlockReport),
    Flagged(&'a RiskRecord),
}

fn impact_text(class: Classification) -> &'static str {
    match class {
        Classification::User => "Low impact: user process, unsaved work may be lost.",
        Classification::System => {
            "Medium impact: system process, dependent services may fail and need a restart."
        }
        Classification::Critical => {
            "Excluded: critical process, termination may crash or destabilize the host."
        }
    }
}

fn pros_cons(action: RecoveryAction, class: Classification) -> (Vec<String>, Vec<String>) {
    let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    match action {
        RecoveryAction::Terminate => {
            let pros = if class == Classification::User {
                list(&["Immediately breaks deadlock", "Frees up resources"])
            } else {
                list(&["Breaks deadlock", "Frees system resources"])
            };
            let mut cons = list(&["Unsaved work may be lost"]);
            if class == Classification::System {
                cons.extend(list(&["May affect system stability", "Dependent processes may fail"]));
            }
            (pros, cons)
        }
        RecoveryAction::Rollback => (
            list(&["Releases held instances", "Process can resume from its checkpoint"]),
            list(&["Work since the last checkpoint is repeated"]),
        ),
        RecoveryAction::PreemptResource => (
            list(&["Critical process keeps running"]),
            list(&["Preempted holder must re-acquire the resource"]),
        ),
        RecoveryAction::Wait => (Vec::new(), list(&["Deadlock persists until resolved externally"])),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Size of the deadlock set of `ledger`, without logging a report.
fn deadlock_size(ledger: &Ledger) -> usize {
    let matrix = ledger.matrix();
    matrix.reduce(&matrix.request).unfinished().count()
}

/// Members of the deadlock set of `ledger`, without logging a report.
fn deadlocked(ledger: &Ledger) -> Vec<ProcessId> {
    let matrix = ledger.matrix();
    let reduction = matrix.reduce(&matrix.request);
    reduction
        .unfinished()
        .map(|i| matrix.processes[i].clone())
        .collect()
}

/// Ranks recovery options for one ledger state.
#[derive(Debug, Clone)]
pub struct RecoverySelector<'a> {
    ledger: &'a Ledger,
    classes: &'a ClassificationMap,
    snapshots: BTreeMap<ProcessId, &'a ProcessSnapshot>,
}

impl<'a> RecoverySelector<'a> {
    pub fn new(ledger: &'a Ledger, classes: &'a ClassificationMap) -> Self {
        RecoverySelector {
            ledger,
            classes,
            snapshots: BTreeMap::new(),
        }
    }

    /// Live attributes used to refine impact scores.
    pub fn with_snapshots(mut self, snapshots: &'a [ProcessSnapshot]) -> Self {
        self.snapshots = snapshots.iter().map(|s| (s.id.clone(), s)).collect();
        self
    }

    /// The stricter of the map entry and the ledger's own tag, else User.
    ///
    /// A map entry can raise a process's class but never lower the tag it
    /// was registered with.
    pub fn classification(&self, process: &ProcessId) -> Classification {
        let mapped = self.classes.get(process).copied();
        let tagged = self.ledger.classification(process);
        mapped.max(tagged).unwrap_or_default()
    }

    /// Type base plus memory, CPU, and thread contributions; halved for Rollback.
    pub fn impact_score(&self, process: &ProcessId, action: RecoveryAction) -> f64 {
        let mut score = self.classification(process).base_impact();
        if let Some(snap) = self.snapshots.get(process) {
            score += snap.memory_percent.unwrap_or(0.0) * 0.5;
            score += snap.cpu_percent * 0.3;
            score += f64::from(snap.thread_count) * 0.5;
        }
        if action == RecoveryAction::Rollback {
            score *= 0.5;
        }
        round2(score)
    }

    fn recommendation(
        &self,
        target: &ProcessId,
        action: RecoveryAction,
        estimated_unblocked: usize,
        rationale: String,
    ) -> RecoveryRecommendation {
        let classification = self.classification(target);
        let (pros, cons) = pros_cons(action, classification);
        RecoveryRecommendation {
            target: target.clone(),
            action,
            classification,
            estimated_unblocked,
            impact: impact_text(classification).to_string(),
            impact_score: self.impact_score(target, action),
            eligible: classification.is_terminable(),
            preemption: None,
            pros,
            cons,
            rationale,
        }
    }

    /// Participants of `report` that become finishable once `process` is gone.
    pub fn unblocked_by_removal(&self, report: &DeadlockReport, process: &ProcessId) -> usize {
        let mut trial = self.ledger.snapshot();
        if trial.remove_process(process).is_err() {
            return 0;
        }
        let others = report.participants.len() - usize::from(report.is_participant(process));
        others.saturating_sub(deadlock_size(&trial))
    }

    /// Other participants of `report` that become finishable once `process`
    /// has rolled back to holding nothing.
    pub fn unblocked_by_rollback(&self, report: &DeadlockReport, process: &ProcessId) -> usize {
        let mut trial = self.ledger.snapshot();
        if trial.roll_back(process).is_err() {
            return 0;
        }
        let others = report.participants.len() - usize::from(report.is_participant(process));
        let stuck = deadlocked(&trial).iter().filter(|p| *p != process).count();
        others.saturating_sub(stuck)
    }

    /// Best non-Critical holder to preempt on behalf of a Critical `process`.
    fn preemption_for(
        &self,
        report: &DeadlockReport,
        process: &ProcessId,
    ) -> Option<(Preemption, usize)> {
        let mut best: Option<(Preemption, usize)> = None;
        for (resource, _) in self.ledger.requested(process) {
            for (holder, _) in self.ledger.processes() {
                let held = self.ledger.allocation(resource, holder);
                if holder == process || held == 0 || !self.classification(holder).is_terminable() {
                    continue;
                }
                let mut trial = self.ledger.snapshot();
                let pending = trial.pending_request(holder, resource);
                let simulated = trial
                    .release(resource, holder, held)
                    .and_then(|_| trial.request(holder, resource, pending + held));
                if simulated.is_err() {
                    continue;
                }
                let unblocked = report.participants.len().saturating_sub(deadlock_size(&trial));
                let candidate = Preemption {
                    from: holder.clone(),
                    resource: resource.clone(),
                    amount: held,
                };
                let better = match &best {
                    None => true,
                    Some((current, current_unblocked)) => {
                        unblocked > *current_unblocked
                            || (unblocked == *current_unblocked
                                && (&candidate.from, &candidate.resource)
                                    < (&current.from, &current.resource))
                    }
                };
                if better {
                    best = Some((candidate, unblocked));
                }
            }
        }
        best
    }

    fn for_deadlock(&self, report: &DeadlockReport) -> Vec<RecoveryRecommendation> {
        let mut out = Vec::new();
        for process in &report.participants {
            let class = self.classification(process);
            if class.is_terminable() {
                let unblocked = self.unblocked_by_removal(report, process);
                out.push(self.recommendation(
                    process,
                    RecoveryAction::Terminate,
                    unblocked,
                    format!("Terminating {process} frees its holdings and unblocks {unblocked} process(es)."),
                ));
                let resumed = self.unblocked_by_rollback(report, process);
                out.push(self.recommendation(
                    process,
                    RecoveryAction::Rollback,
                    resumed,
                    format!("Rolling back {process} releases its holdings and unblocks {resumed} process(es); it re-acquires them afterwards."),
                ));
                continue;
            }

            match self.preemption_for(report, process) {
                Some((preemption, unblocked)) => {
                    let rationale = format!(
                        "{process} is critical; preempt {} of {} from {} instead.",
                        preemption.amount, preemption.resource, preemption.from
                    );
                    let mut rec = self.recommendation(
                        process,
                        RecoveryAction::PreemptResource,
                        unblocked,
                        rationale,
                    );
                    rec.preemption = Some(preemption);
                    out.push(rec);
                }
                None => out.push(self.recommendation(
                    process,
                    RecoveryAction::Wait,
                    0,
                    format!("{process} is critical and no preemptible holder exists; wait."),
                )),
            }
        }

        out.sort_by(|a, b| {
            b.estimated_unblocked
                .cmp(&a.estimated_unblocked)
                .then_with(|| a.target.cmp(&b.target))
                .then_with(|| a.action.cmp(&b.action))
        });
        out
    }

    fn for_risk(&self, record: &RiskRecord) -> RecoveryRecommendation {
        let process = &record.process;
        let class = self.classification(process);
        match record.level {
            RiskLevel::High if class.is_terminable() => {
                let report = detect_deadlock(self.ledger);
                let unblocked = if self.ledger.contains_process(process) {
                    self.unblocked_by_removal(&report, process)
                } else {
                    0
                };
                self.recommendation(
                    process,
                    RecoveryAction::Terminate,
                    unblocked,
                    format!("{process} is HIGH risk (score {:.1}); terminate it.", record.score),
                )
            }
            RiskLevel::High => self.recommendation(
                process,
                RecoveryAction::Wait,
                0,
                format!("{process} is HIGH risk but critical; wait and escalate."),
            ),
            RiskLevel::Medium => self.recommendation(
                process,
                RecoveryAction::Wait,
                0,
                format!(
                    "{process} is MEDIUM risk (score {:.1}); keep monitoring its resource usage.",
                    record.score
                ),
            ),
            RiskLevel::Low => self.recommendation(
                process,
                RecoveryAction::Wait,
                0,
                format!("{process} is LOW risk; no action needed."),
            ),
        }
    }

    /// Ranked recommendations for one event. Pure: re-evaluate on demand.
    pub fn select(&self, input: RecoveryInput<'_>) -> Vec<RecoveryRecommendation> {
        let ranked = match input {
            RecoveryInput::Detected(report) => self.for_deadlock(report),
            RecoveryInput::Flagged(record) => vec![self.for_risk(record)],
        };
        for rec in &ranked {
            debug!(
                stage = %Stage::Recover,
                target = %rec.target,
                action = %rec.action,
                unblocked = rec.estimated_unblocked,
                eligible = rec.eligible,
                "candidate"
            );
        }
        info!(
            event = event_names::RECOVERY_RANKED,
            stage = %Stage::Recover,
            candidates = ranked.len(),
            "recovery options ranked"
        );
        ranked
    }
}

/// Detect on `ledger` and rank recovery options for whatever is deadlocked.
pub fn recommend_recovery(
    ledger: &Ledger,
    classes: &ClassificationMap,
) -> Vec<RecoveryRecommendation> {
    let report = detect_deadlock(ledger);
    RecoverySelector::new(ledger, classes).select(RecoveryInput::Detected(&report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str) -> ProcessId {
        ProcessId::from(id)
    }

    fn r(id: &str) -> ResourceId {
        ResourceId::from(id)
    }

    fn cycle() -> Ledger {
        let mut l = Ledger::new();
        l.add_process("P1", None).unwrap();
        l.add_process("P2", None).unwrap();
        l.add_resource("R1", 1).unwrap();
        l.add_resource("R2", 1).unwrap();
        l.allocate(&r("R1"), &p("P1"), 1).unwrap();
        l.allocate(&r("R2"), &p("P2"), 1).unwrap();
        l.request(&p("P1"), &r("R2"), 1).unwrap();
        l.request(&p("P2"), &r("R1"), 1).unwrap();
        l
    }

    #[test]
    fn test_no_deadlock_no_recommendations() {
        assert!(recommend_recovery(&Ledger::new(), &ClassificationMap::new()).is_empty());
    }

    #[test]
    fn test_user_cycle_ranks_by_id_then_action() {
        let recs = recommend_recovery(&cycle(), &ClassificationMap::new());
        let order: Vec<(&str, RecoveryAction)> =
            recs.iter().map(|r| (r.target.as_str(), r.action)).collect();
        assert_eq!(
            order,
            vec![
                ("P1", RecoveryAction::Terminate),
                ("P1", RecoveryAction::Rollback),
                ("P2", RecoveryAction::Terminate),
                ("P2", RecoveryAction::Rollback),
            ]
        );
        assert!(recs.iter().all(|r| r.estimated_unblocked == 1 && r.eligible));
        assert_eq!(recs[0].impact_score, 10.0);
        assert_eq!(recs[1].impact_score, 5.0);
    }

    #[test]
    fn test_critical_gets_preemption_not_terminate() {
        let mut classes = ClassificationMap::new();
        classes.insert(p("P1"), Classification::Critical);
        let recs = recommend_recovery(&cycle(), &classes);
        assert!(!recs
            .iter()
            .any(|r| r.target == p("P1") && r.action == RecoveryAction::Terminate));
        let preempt = recs
            .iter()
            .find(|r| r.action == RecoveryAction::PreemptResource)
            .unwrap();
        assert!(!preempt.eligible);
        assert_eq!(
            preempt.preemption,
            Some(Preemption {
                from: p("P2"),
                resource: r("R2"),
                amount: 1
            })
        );
    }

    #[test]
    fn test_ledger_critical_tag_wins_over_map() {
        let mut ledger = Ledger::new();
        ledger.add_process("P1", Some(Classification::Critical)).unwrap();
        ledger.add_process("P2", None).unwrap();
        ledger.add_resource("R1", 1).unwrap();
        ledger.add_resource("R2", 1).unwrap();
        ledger.allocate(&r("R1"), &p("P1"), 1).unwrap();
        ledger.allocate(&r("R2"), &p("P2"), 1).unwrap();
        ledger.request(&p("P1"), &r("R2"), 1).unwrap();
        ledger.request(&p("P2"), &r("R1"), 1).unwrap();

        let mut classes = ClassificationMap::new();
        classes.insert(p("P1"), Classification::User);
        classes.insert(p("P2"), Classification::System);
        let selector = RecoverySelector::new(&ledger, &classes);
        assert_eq!(selector.classification(&p("P1")), Classification::Critical);
        assert_eq!(selector.classification(&p("P2")), Classification::System);

        let recs = recommend_recovery(&ledger, &classes);
        for rec in recs.iter().filter(|r| r.target == p("P1")) {
            assert!(!matches!(rec.action, RecoveryAction::Terminate | RecoveryAction::Rollback));
            assert!(!rec.eligible);
        }
        let top = recs.iter().find(|r| r.eligible).unwrap();
        assert_eq!(top.target, p("P2"));
    }

    #[test]
    fn test_rollback_leverage_counts_other_participants() {
        let recs = recommend_recovery(&cycle(), &ClassificationMap::new());
        let rollback = recs
            .iter()
            .find(|r| r.target == p("P1") && r.action == RecoveryAction::Rollback)
            .unwrap();
        assert_eq!(rollback.estimated_unblocked, 1);
        assert!(rollback.rationale.contains("re-acquires"));
    }

    #[test]
    fn test_all_critical_degrades_to_wait() {
        let mut classes = ClassificationMap::new();
        classes.insert(p("P1"), Classification::Critical);
        classes.insert(p("P2"), Classification::Critical);
        let recs = recommend_recovery(&cycle(), &classes);
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.action == RecoveryAction::Wait && !r.eligible));
    }

    #[test]
    fn test_snapshot_raises_impact() {
        let ledger = cycle();
        let classes = ClassificationMap::new();
        let snaps = vec![ProcessSnapshot {
            memory_percent: Some(10.0),
            cpu_percent: 10.0,
            thread_count: 4,
            ..ProcessSnapshot::new("P1")
        }];
        let selector = RecoverySelector::new(&ledger, &classes).with_snapshots(&snaps);
        assert_eq!(selector.impact_score(&p("P1"), RecoveryAction::Terminate), 20.0);
    }

    #[test]
    fn test_flagged_levels() {
        let ledger = Ledger::new();
        let classes = ClassificationMap::new();
        let selector = RecoverySelector::new(&ledger, &classes);
        let record = |level| RiskRecord {
            process: p("P9"),
            score: 80.0,
            level,
            factors: Vec::new(),
        };
        let high = record(RiskLevel::High);
        let medium = record(RiskLevel::Medium);
        assert_eq!(
            selector.select(RecoveryInput::Flagged(&high))[0].action,
            RecoveryAction::Terminate
        );
        let waiting = &selector.select(RecoveryInput::Flagged(&medium))[0];
        assert_eq!(waiting.action, RecoveryAction::Wait);
        assert!(waiting.rationale.contains("monitoring"));
    }

    #[test]
    fn test_selector_does_not_mutate() {
        let ledger = cycle();
        let before = ledger.clone();
        let _ = recommend_recovery(&ledger, &ClassificationMap::new());
        assert_eq!(ledger, before);
    }
}
