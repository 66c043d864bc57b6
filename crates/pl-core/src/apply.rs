//! Carrying out or dismissing a recovery recommendation.
//!
//! Recommendations end in one of two terminal states. Applied means the
//! ledger was updated through its ordinary mutators (and, for a live
//! process, the host was asked to terminate it). Dismissed means nothing
//! changed. The selector never performs either transition itself.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pl_common::{Classification, Error, ProcessId, ResourceId, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::host::ProcessHost;
use crate::ledger::Ledger;
use crate::logging::{event_names, Stage};
use crate::recovery::{RecoveryAction, RecoveryRecommendation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    Applied,
    Dismissed,
}

/// Record of a terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    pub target: ProcessId,
    pub action: RecoveryAction,
    pub state: RecoveryState,
    /// Instances returned to the pool by this step.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub released: BTreeMap<ResourceId, u32>,
    /// Whether the host terminated a live process.
    pub host_terminated: bool,
    pub message: String,
    pub at: DateTime<Utc>,
}

fn is_critical(ledger: &Ledger, process: &ProcessId) -> bool {
    ledger.classification(process) == Some(Classification::Critical)
}

/// Apply `rec` to `ledger`, calling `host` for live processes.
///
/// All-or-nothing: on error the ledger is unchanged.
pub fn apply_recommendation(
    ledger: &mut Ledger,
    rec: &RecoveryRecommendation,
    host: Option<&dyn ProcessHost>,
) -> Result<RecoveryOutcome> {
    let target = &rec.target;
    let mut released = BTreeMap::new();
    let mut host_terminated = false;

    let message = match rec.action {
        RecoveryAction::Terminate | RecoveryAction::Rollback => {
            if rec.classification == Classification::Critical || is_critical(ledger, target) {
                return Err(Error::ProtectedProcess {
                    process: target.0.clone(),
                });
            }
            if !ledger.contains_process(target) {
                return Err(Error::unknown_process(target.as_str()));
            }
            if rec.action == RecoveryAction::Rollback {
                released = ledger.roll_back(target)?;
                format!("Process {target} rolled back; it waits to re-acquire what it released.")
            } else {
                if let (Some(host), Some(pid)) = (host, target.as_pid()) {
                    host.terminate(pid)?;
                    host_terminated = true;
                }
                released = ledger.remove_process(target)?;
                format!("Process {target} removed from the ledger (Terminate).")
            }
        }
        RecoveryAction::PreemptResource => {
            let preemption = rec.preemption.as_ref().ok_or_else(|| {
                Error::Host(format!("recommendation for {target} names no holder to preempt"))
            })?;
            if is_critical(ledger, &preemption.from) {
                return Err(Error::ProtectedProcess {
                    process: preemption.from.0.clone(),
                });
            }
            let mut trial = ledger.snapshot();
            let pending = trial.pending_request(&preemption.from, &preemption.resource);
            trial.release(&preemption.resource, &preemption.from, preemption.amount)?;
            trial.request(
                &preemption.from,
                &preemption.resource,
                pending + preemption.amount,
            )?;
            *ledger = trial;
            released.insert(preemption.resource.clone(), preemption.amount);
            format!(
                "Preempted {} of {} from {}; it now waits to re-acquire them.",
                preemption.amount, preemption.resource, preemption.from
            )
        }
        RecoveryAction::Wait => format!("No change; {target} left to resolve on its own."),
    };

    info!(
        event = event_names::APPLY_FINISHED,
        stage = %Stage::Apply,
        target = %target,
        action = %rec.action,
        host_terminated,
        "{message}"
    );

    Ok(RecoveryOutcome {
        target: target.clone(),
        action: rec.action,
        state: RecoveryState::Applied,
        released,
        host_terminated,
        message,
        at: Utc::now(),
    })
}

/// Record that `rec` was declined. The ledger is not touched.
pub fn dismiss(rec: &RecoveryRecommendation) -> RecoveryOutcome {
    info!(
        event = event_names::APPLY_DISMISSED,
        stage = %Stage::Apply,
        target = %rec.target,
        action = %rec.action
    );
    RecoveryOutcome {
        target: rec.target.clone(),
        action: rec.action,
        state: RecoveryState::Dismissed,
        released: BTreeMap::new(),
        host_terminated: false,
        message: format!("{} of {} dismissed.", rec.action, rec.target),
        at: Utc::now(),
    }
}
