//! Safe-state prediction (Banker's algorithm).
//!
//! A state is safe when some completion order exists in which every process
//! can be granted its remaining need from the pool, finish, and return its
//! holdings. The predictor reports the deterministic order it found
//! (lowest identifier first among eligible processes) or, when stuck, the
//! first process that could not proceed.
//!
//! # Maximum need
//!
//! ```text
//! max[p][r]  = max(declared[p][r], held[p][r] + requested[p][r])
//! need[p][r] = max[p][r] - held[p][r]
//! ```
//!
//! Without a declaration the maximum is held + requested, so safety is judged
//! against outstanding requests only.
//!
//! The what-if mode evaluates a hypothetical grant on a private copy of the
//! ledger; the caller's ledger is never touched.

use std::collections::BTreeMap;

use pl_common::{Error, ProcessId, ResourceId, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ledger::Ledger;
use crate::logging::{event_names, Stage};

/// Outstanding need of one process for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeedEntry {
    pub process: ProcessId,
    pub resource: ResourceId,
    pub amount: u32,
}

/// The grant a what-if evaluation assumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hypothetical {
    pub process: ProcessId,
    pub resource: ResourceId,
    pub amount: u32,
}

/// Result of a safety check or what-if evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub is_safe: bool,
    /// Completion order; empty when unsafe.
    pub safe_sequence: Vec<ProcessId>,
    /// Smallest unfinished process when no eligible process remained.
    pub first_blocking_process: Option<ProcessId>,
    /// Pool at the start of the check.
    pub available: BTreeMap<ResourceId, u32>,
    /// Pool after every finishable process released its holdings.
    pub final_work: BTreeMap<ResourceId, u32>,
    /// Non-zero entries of the need matrix used.
    pub need: Vec<NeedEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothetical: Option<Hypothetical>,
    /// Why a what-if was rejected before the safety pass ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub message: String,
}

fn join(ids: &[ProcessId]) -> String {
    ids.iter()
        .map(ProcessId::as_str)
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Banker's safety check over the current ledger state.
pub fn check_safe_state(ledger: &Ledger) -> SafetyReport {
    let matrix = ledger.matrix();
    let need_matrix = matrix.need();
    let reduction = matrix.reduce(&need_matrix);

    let is_safe = reduction.is_complete();
    let order: Vec<ProcessId> = reduction
        .order
        .iter()
        .map(|&i| matrix.processes[i].clone())
        .collect();
    let first_blocking_process = reduction
        .unfinished()
        .next()
        .map(|i| matrix.processes[i].clone());

    let by_resource = |values: &[u32]| -> BTreeMap<ResourceId, u32> {
        matrix.resources.iter().cloned().zip(values.iter().copied()).collect()
    };
    let mut need = Vec::new();
    for (i, row) in need_matrix.iter().enumerate() {
        for (j, &amount) in row.iter().enumerate() {
            if amount > 0 {
                need.push(NeedEntry {
                    process: matrix.processes[i].clone(),
                    resource: matrix.resources[j].clone(),
                    amount,
                });
            }
        }
    }

    let message = match (&first_blocking_process, is_safe) {
        (_, true) if order.is_empty() => "System is in a safe state (no processes).".to_string(),
        (_, true) => format!("System is in a safe state. Safe sequence: {}", join(&order)),
        (Some(blocked), false) => format!(
            "System is in an UNSAFE state: {blocked} cannot obtain its remaining need."
        ),
        (None, false) => "System is in an UNSAFE state.".to_string(),
    };

    debug!(
        stage = %Stage::Predict,
        finished = order.len(),
        processes = matrix.processes.len(),
        "safety pass complete"
    );
    info!(event = event_names::SAFETY_FINISHED, stage = %Stage::Predict, is_safe, "{message}");

    SafetyReport {
        is_safe,
        safe_sequence: if is_safe { order } else { Vec::new() },
        first_blocking_process,
        available: by_resource(&matrix.available),
        final_work: by_resource(&reduction.work),
        need,
        hypothetical: None,
        reason: None,
        message,
    }
}

/// Would granting `n` of `resource` to `process` keep the system safe?
///
/// Errors only for unknown entities or `n == 0`. A grant larger than the
/// current pool, or one beyond a declared maximum, is reported unsafe with a
/// `reason` and no safety pass.
pub fn what_if(
    ledger: &Ledger,
    process: &ProcessId,
    resource: &ResourceId,
    n: u32,
) -> Result<SafetyReport> {
    if !ledger.contains_process(process) {
        return Err(Error::unknown_process(process.as_str()));
    }
    if !ledger.contains_resource(resource) {
        return Err(Error::unknown_resource(resource.as_str()));
    }
    if n == 0 {
        return Err(Error::NonPositiveAmount { amount: 0 });
    }

    let hypothetical = Hypothetical {
        process: process.clone(),
        resource: resource.clone(),
        amount: n,
    };

    let available = ledger.available(resource);
    let held = ledger.allocation(resource, process);
    let rejection = if n > available {
        Some(format!(
            "insufficient available: need {n} of {resource}, have {available}"
        ))
    } else {
        ledger
            .declared_max(process, resource)
            .filter(|&max| u64::from(held) + u64::from(n) > u64::from(max))
            .map(|max| {
                format!("request exceeds maximum need for {process}: {held} held + {n} > {max} declared")
            })
    };

    let report = match rejection {
        Some(reason) => {
            let base = check_safe_state(ledger);
            SafetyReport {
                is_safe: false,
                safe_sequence: Vec::new(),
                message: format!("UNSAFE! Request denied: {reason}."),
                reason: Some(reason),
                hypothetical: Some(hypothetical),
                ..base
            }
        }
        None => {
            let mut trial = ledger.snapshot();
            trial.allocate(resource, process, n)?;
            let base = check_safe_state(&trial);
            let message = if base.is_safe {
                format!(
                    "Safe to allocate! System remains in safe state. Safe sequence: {}",
                    join(&base.safe_sequence)
                )
            } else {
                "UNSAFE! Allocating would lead to potential deadlock. Request denied.".to_string()
            };
            SafetyReport {
                message,
                hypothetical: Some(hypothetical),
                ..base
            }
        }
    };

    info!(
        event = event_names::WHATIF_FINISHED,
        stage = %Stage::Predict,
        %process,
        %resource,
        n,
        is_safe = report.is_safe,
        "{}",
        report.message
    );
    Ok(report)
}
