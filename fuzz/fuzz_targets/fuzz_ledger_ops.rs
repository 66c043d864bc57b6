//! Fuzz target for ledger mutation sequences.
//!
//! Replays arbitrary mutator calls and checks the capacity invariant after
//! every step, and that a rejected call leaves the ledger unchanged.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pl_common::{ProcessId, ResourceId};
use pl_core::ledger::Ledger;

#[derive(Debug, Arbitrary)]
enum Op {
    AddProcess(u8),
    AddResource(u8, u8),
    Allocate(u8, u8, u8),
    Request(u8, u8, u8),
    Release(u8, u8, u8),
    CancelRequest(u8, u8),
    DeclareMax(u8, u8, u8),
    RollBack(u8),
    RemoveProcess(u8),
    RemoveResource(u8),
}

fn pid(i: u8) -> ProcessId {
    ProcessId::new(format!("P{}", i % 8))
}

fn rid(j: u8) -> ResourceId {
    ResourceId::new(format!("R{}", j % 4))
}

fuzz_target!(|ops: Vec<Op>| {
    let mut ledger = Ledger::new();
    for op in ops {
        let before = ledger.clone();
        let result = match op {
            Op::AddProcess(p) => ledger.add_process(pid(p), None),
            Op::AddResource(r, n) => ledger.add_resource(rid(r), u32::from(n)),
            Op::Allocate(p, r, n) => ledger.allocate(&rid(r), &pid(p), u32::from(n)),
            Op::Request(p, r, n) => ledger.request(&pid(p), &rid(r), u32::from(n)),
            Op::Release(p, r, n) => ledger.release(&rid(r), &pid(p), u32::from(n)),
            Op::CancelRequest(p, r) => ledger.cancel_request(&pid(p), &rid(r)).map(|_| ()),
            Op::DeclareMax(p, r, n) => ledger.declare_max(&pid(p), &rid(r), u32::from(n)),
            Op::RollBack(p) => ledger.roll_back(&pid(p)).map(|_| ()),
            Op::RemoveProcess(p) => ledger.remove_process(&pid(p)).map(|_| ()),
            Op::RemoveResource(r) => ledger.remove_resource(&rid(r)),
        };
        if result.is_err() {
            assert_eq!(ledger, before);
        }
        for (resource, total) in ledger.resources() {
            assert!(ledger.allocated(resource) <= total);
        }
    }
    let _ = pl_core::detect_deadlock(&ledger);
    let _ = pl_core::check_safe_state(&ledger);
});
