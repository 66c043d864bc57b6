//! Deadlock detection by graph reduction.
//!
//! Multi-instance resources are handled by reduction: any process whose
//! whole outstanding request fits in the pool is finishable, gives its
//! holdings back, and drops out. Whatever is still unfinished once the pool
//! stops growing is deadlocked.
//!
//! For display the detector also walks wait-for edges among the
//! participants and reports each closed cycle as an alternating
//! process → resource → process path. With single-instance resources this
//! is exactly the classical RAG cycle.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use pl_common::{ProcessId, ResourceId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ledger::{AllocationMatrix, Ledger};
use crate::logging::{event_names, Stage};

/// One node on a reported cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum GraphNode {
    Process(ProcessId),
    Resource(ResourceId),
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphNode::Process(p) => write!(f, "{p}"),
            GraphNode::Resource(r) => write!(f, "{r}"),
        }
    }
}

/// Result of [`detect_deadlock`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlockReport {
    pub deadlocked: bool,
    /// Unfinished processes after reduction, ascending.
    pub participants: Vec<ProcessId>,
    /// Resources held by at least one participant, ascending.
    pub held_resources: Vec<ResourceId>,
    /// Closed wait-for cycles; first and last node are the same process.
    pub cycles: Vec<Vec<GraphNode>>,
    /// Processes in the order reduction finished them.
    pub finish_order: Vec<ProcessId>,
    pub message: String,
}

impl DeadlockReport {
    pub fn is_participant(&self, process: &ProcessId) -> bool {
        self.participants.binary_search(process).is_ok()
    }
}

fn render_cycle(cycle: &[GraphNode]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Run graph reduction on `ledger` and report the deadlocked set.
///
/// Never fails: an empty ledger is simply not deadlocked.
pub fn detect_deadlock(ledger: &Ledger) -> DeadlockReport {
    let matrix = ledger.matrix();
    let reduction = matrix.reduce(&matrix.request);

    let unfinished: Vec<usize> = reduction.unfinished().collect();
    let participants: Vec<ProcessId> = unfinished
        .iter()
        .map(|&i| matrix.processes[i].clone())
        .collect();
    let held_resources: Vec<ResourceId> = (0..matrix.resources.len())
        .filter(|&j| unfinished.iter().any(|&i| matrix.allocation[i][j] > 0))
        .map(|j| matrix.resources[j].clone())
        .collect();
    let cycles = extract_cycles(&matrix, &reduction.finished, &reduction.work);
    let finish_order = reduction
        .order
        .iter()
        .map(|&i| matrix.processes[i].clone())
        .collect();

    let deadlocked = !participants.is_empty();
    let message = if !deadlocked {
        "No deadlock detected.".to_string()
    } else if cycles.is_empty() {
        let ids: Vec<&str> = participants.iter().map(ProcessId::as_str).collect();
        format!("Deadlock detected! Blocked: {}", ids.join(", "))
    } else {
        let rendered: Vec<String> = cycles.iter().map(|c| render_cycle(c)).collect();
        format!("Deadlock detected! Cycle: {}", rendered.join("; "))
    };

    info!(
        event = event_names::DETECT_FINISHED,
        stage = %Stage::Detect,
        deadlocked,
        participants = participants.len(),
        cycles = cycles.len(),
        "{message}"
    );

    DeadlockReport {
        deadlocked,
        participants,
        held_resources,
        cycles,
        finish_order,
        message,
    }
}

/// Walk wait-for edges from each uncovered participant until a process
/// repeats (a new cycle) or the walk joins one already explored.
///
/// A participant `p` waits on resource `j` when `request[p][j] > work[j]`.
/// Because held + requested never exceeds the total, such a `j` always has
/// an unfinished holder other than `p`, so every walk can continue.
fn extract_cycles(matrix: &AllocationMatrix, finished: &[bool], work: &[u32]) -> Vec<Vec<GraphNode>> {
    let mut covered: BTreeSet<usize> = BTreeSet::new();
    let mut cycles = Vec::new();

    for start in (0..matrix.processes.len()).filter(|&i| !finished[i]) {
        if covered.contains(&start) {
            continue;
        }

        let mut path: Vec<GraphNode> = Vec::new();
        let mut position: HashMap<usize, usize> = HashMap::new();
        let mut current = start;

        loop {
            if let Some(&at) = position.get(&current) {
                let mut cycle = path[at..].to_vec();
                cycle.push(GraphNode::Process(matrix.processes[current].clone()));
                debug!(stage = %Stage::Detect, cycle = %render_cycle(&cycle), "cycle closed");
                cycles.push(cycle);
                break;
            }
            if covered.contains(&current) {
                break;
            }
            position.insert(current, path.len());
            path.push(GraphNode::Process(matrix.processes[current].clone()));

            let next = (0..matrix.resources.len())
                .filter(|&j| matrix.request[current][j] > work[j])
                .find_map(|j| {
                    (0..matrix.processes.len())
                        .find(|&q| q != current && !finished[q] && matrix.allocation[q][j] > 0)
                        .map(|q| (j, q))
                });
            match next {
                Some((j, q)) => {
                    path.push(GraphNode::Resource(matrix.resources[j].clone()));
                    current = q;
                }
                None => break,
            }
        }

        covered.extend(position.into_keys());
    }

    cycles
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

    fn two_way_deadlock() -> Ledger {
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
    fn test_empty_ledger_is_not_deadlocked() {
        let report = detect_deadlock(&Ledger::new());
        assert!(!report.deadlocked);
        assert_eq!(report.message, "No deadlock detected.");
    }

    #[test]
    fn test_two_way_cycle_is_reported_in_order() {
        let report = detect_deadlock(&two_way_deadlock());
        assert!(report.deadlocked);
        assert_eq!(report.participants, vec![p("P1"), p("P2")]);
        assert_eq!(report.held_resources, vec![r("R1"), r("R2")]);
        assert_eq!(
            report.message,
            "Deadlock detected! Cycle: P1 → R2 → P2 → R1 → P1"
        );
        assert_eq!(report.cycles.len(), 1);
        assert!(report.finish_order.is_empty());
    }

    #[test]
    fn test_holder_without_request_is_finishable() {
        let mut l = Ledger::new();
        l.add_process("P1", None).unwrap();
        l.add_process("P2", None).unwrap();
        l.add_resource("R1", 1).unwrap();
        l.allocate(&r("R1"), &p("P1"), 1).unwrap();
        l.request(&p("P2"), &r("R1"), 1).unwrap();
        let report = detect_deadlock(&l);
        assert!(!report.deadlocked);
        assert_eq!(report.finish_order, vec![p("P1"), p("P2")]);
    }

    #[test]
    fn test_multi_instance_spare_breaks_cycle() {
        let mut l = two_way_deadlock();
        l.remove_process(&p("P2")).unwrap();
        l.add_resource("R3", 2).unwrap();
        l.add_process("P3", None).unwrap();
        l.allocate(&r("R3"), &p("P3"), 1).unwrap();
        l.request(&p("P1"), &r("R3"), 1).unwrap();
        assert!(!detect_deadlock(&l).deadlocked);
    }

    #[test]
    fn test_waiter_on_cycle_is_participant_but_not_on_cycle() {
        let mut l = two_way_deadlock();
        l.add_process("P3", None).unwrap();
        l.request(&p("P3"), &r("R1"), 1).unwrap();
        let report = detect_deadlock(&l);
        assert_eq!(report.participants, vec![p("P1"), p("P2"), p("P3")]);
        assert_eq!(report.cycles.len(), 1);
        assert!(!report.cycles[0].contains(&GraphNode::Process(p("P3"))));
    }

    #[test]
    fn test_detection_is_idempotent() {
        let l = two_way_deadlock();
        assert_eq!(detect_deadlock(&l), detect_deadlock(&l));
    }

    #[test]
    fn test_graph_node_serializes_tagged() {
        let json = serde_json::to_string(&GraphNode::Resource(r("R1"))).unwrap();
        assert_eq!(json, r#"{"type":"resource","id":"R1"}"#);
    }
}
