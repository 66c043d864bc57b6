//! Fuzz target for scenario documents.
//!
//! Any document that parses and replays into a ledger must be analyzable
//! without panicking, and recovery must never offer to terminate a
//! critical process.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pl_common::Classification;
use pl_core::recovery::RecoveryAction;
use pl_core::scenario::Scenario;
use pl_core::{check_safe_state, detect_deadlock, recommend_recovery};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(scenario) = Scenario::from_json(text) else {
        return;
    };
    let Ok(ledger) = scenario.build() else {
        return;
    };

    let report = detect_deadlock(&ledger);
    let safety = check_safe_state(&ledger);
    // Need is at least the pending request, so a deadlock is never safe
    assert!(!report.deadlocked || !safety.is_safe);

    let classes = scenario.classifications(None);
    for rec in recommend_recovery(&ledger, &classes) {
        if rec.classification == Classification::Critical {
            assert_ne!(rec.action, RecoveryAction::Terminate);
        }
    }
});
