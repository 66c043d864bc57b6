//! Resource ledger: the resource-allocation graph and its invariants.
//!
//! The ledger owns the process set, the resource set (each with a total
//! instance count), and two edge relations:
//!
//! ```text
//! allocation: resource ──n──▶ process   (instances held)
//! request:    process  ──n──▶ resource  (instances still wanted)
//! ```
//!
//! Invariants maintained by every mutator:
//! - for each resource, the sum of allocated instances never exceeds its total
//! - at most one allocation edge per (resource, process); repeats merge
//! - at most one request edge per (process, resource); repeats replace
//! - held + requested for one (process, resource) never exceeds the total, so
//!   every pending request is satisfiable in isolation
//!
//! Mutators validate before touching any map, so a rejected call leaves the
//! ledger exactly as it was. Analyses never mutate; they read a snapshot
//! through [`Ledger::matrix`].

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use pl_common::{Classification, EntityKind, Error, ProcessId, ResourceId, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::logging::{event_names, Stage};

type Edges = BTreeMap<ResourceId, u32>;

/// In-memory resource-allocation graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    processes: BTreeMap<ProcessId, Option<Classification>>,
    resources: BTreeMap<ResourceId, u32>,
    allocations: BTreeMap<ProcessId, Edges>,
    requests: BTreeMap<ProcessId, Edges>,
    max_claims: BTreeMap<ProcessId, Edges>,
}

fn positive(n: u32) -> Result<u32> {
    if n == 0 {
        return Err(Error::NonPositiveAmount { amount: 0 });
    }
    Ok(n)
}

fn rejected<T>(op: &'static str, err: Error) -> Result<T> {
    warn!(
        event = event_names::LEDGER_REJECTED,
        stage = %Stage::Ledger,
        op,
        code = err.code(),
        %err,
        "ledger mutation rejected"
    );
    Err(err)
}

fn edge(map: &BTreeMap<ProcessId, Edges>, process: &ProcessId, resource: &ResourceId) -> u32 {
    map.get(process)
        .and_then(|edges| edges.get(resource))
        .copied()
        .unwrap_or(0)
}

fn set_edge(
    map: &mut BTreeMap<ProcessId, Edges>,
    process: &ProcessId,
    resource: &ResourceId,
    amount: u32,
) {
    if amount == 0 {
        if let Some(edges) = map.get_mut(process) {
            edges.remove(resource);
            if edges.is_empty() {
                map.remove(process);
            }
        }
    } else {
        map.entry(process.clone())
            .or_default()
            .insert(resource.clone(), amount);
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Register a process. Classification is fixed for the process lifetime.
    pub fn add_process(
        &mut self,
        id: impl Into<ProcessId>,
        classification: Option<Classification>,
    ) -> Result<()> {
        let id = id.into();
        if self.processes.contains_key(&id) {
            return rejected(
                "add_process",
                Error::DuplicateEntity {
                    kind: EntityKind::Process,
                    id: id.0,
                },
            );
        }
        debug!(event = event_names::LEDGER_MUTATED, stage = %Stage::Ledger, op = "add_process", process = %id);
        self.processes.insert(id, classification);
        Ok(())
    }

    /// Register a resource with `total` instances (at least one).
    pub fn add_resource(&mut self, id: impl Into<ResourceId>, total: u32) -> Result<()> {
        let id = id.into();
        if let Err(err) = positive(total) {
            return rejected("add_resource", err);
        }
        if self.resources.contains_key(&id) {
            return rejected(
                "add_resource",
                Error::DuplicateEntity {
                    kind: EntityKind::Resource,
                    id: id.0,
                },
            );
        }
        debug!(event = event_names::LEDGER_MUTATED, stage = %Stage::Ledger, op = "add_resource", resource = %id, total);
        self.resources.insert(id, total);
        Ok(())
    }

    /// Grant `n` instances of `resource` to `process`.
    ///
    /// Merges with any existing holding. A pending request on the same
    /// resource is satisfied first: the grant reduces it by up to `n`.
    pub fn allocate(&mut self, resource: &ResourceId, process: &ProcessId, n: u32) -> Result<()> {
        if let Err(err) = self.check_endpoints(process, resource).and_then(|_| positive(n)) {
            return rejected("allocate", err);
        }
        let total = self.resources[resource];
        let available = self.available(resource);
        if n > available {
            return rejected(
                "allocate",
                Error::CapacityExceeded {
                    resource: resource.0.clone(),
                    amount: u64::from(n),
                    available,
                    total,
                },
            );
        }

        let held = edge(&self.allocations, process, resource);
        let pending = edge(&self.requests, process, resource);
        set_edge(&mut self.allocations, process, resource, held + n);
        set_edge(&mut self.requests, process, resource, pending - pending.min(n));
        debug!(
            event = event_names::LEDGER_MUTATED,
            stage = %Stage::Ledger,
            op = "allocate",
            %process,
            %resource,
            n,
            held = held + n,
            "allocation merged"
        );
        Ok(())
    }

    /// Record that `process` now wants `n` more instances of `resource`.
    ///
    /// Replaces any pending amount; requests never accumulate.
    pub fn request(&mut self, process: &ProcessId, resource: &ResourceId, n: u32) -> Result<()> {
        if let Err(err) = self.check_endpoints(process, resource).and_then(|_| positive(n)) {
            return rejected("request", err);
        }
        let total = self.resources[resource];
        let held = edge(&self.allocations, process, resource);
        if u64::from(held) + u64::from(n) > u64::from(total) {
            return rejected(
                "request",
                Error::CapacityExceeded {
                    resource: resource.0.clone(),
                    amount: u64::from(held) + u64::from(n),
                    available: total - held,
                    total,
                },
            );
        }
        set_edge(&mut self.requests, process, resource, n);
        debug!(event = event_names::LEDGER_MUTATED, stage = %Stage::Ledger, op = "request", %process, %resource, n);
        Ok(())
    }

    /// Return `n` held instances of `resource` from `process` to the pool.
    pub fn release(&mut self, resource: &ResourceId, process: &ProcessId, n: u32) -> Result<()> {
        if let Err(err) = self.check_endpoints(process, resource).and_then(|_| positive(n)) {
            return rejected("release", err);
        }
        let held = edge(&self.allocations, process, resource);
        if n > held {
            return rejected(
                "release",
                Error::OverRelease {
                    process: process.0.clone(),
                    resource: resource.0.clone(),
                    held,
                    amount: n,
                },
            );
        }
        set_edge(&mut self.allocations, process, resource, held - n);
        debug!(event = event_names::LEDGER_MUTATED, stage = %Stage::Ledger, op = "release", %process, %resource, n);
        Ok(())
    }

    /// Drop the pending request edge, returning the amount that was pending.
    pub fn cancel_request(&mut self, process: &ProcessId, resource: &ResourceId) -> Result<u32> {
        if let Err(err) = self.check_endpoints(process, resource) {
            return rejected("cancel_request", err);
        }
        let pending = edge(&self.requests, process, resource);
        set_edge(&mut self.requests, process, resource, 0);
        debug!(event = event_names::LEDGER_MUTATED, stage = %Stage::Ledger, op = "cancel_request", %process, %resource, pending);
        Ok(pending)
    }

    /// Declare the most instances of `resource` that `process` may ever hold.
    ///
    /// Without a declaration the safety check uses held + requested.
    pub fn declare_max(&mut self, process: &ProcessId, resource: &ResourceId, n: u32) -> Result<()> {
        if let Err(err) = self.check_endpoints(process, resource).and_then(|_| positive(n)) {
            return rejected("declare_max", err);
        }
        let total = self.resources[resource];
        if n > total {
            return rejected(
                "declare_max",
                Error::CapacityExceeded {
                    resource: resource.0.clone(),
                    amount: u64::from(n),
                    available: total,
                    total,
                },
            );
        }
        set_edge(&mut self.max_claims, process, resource, n);
        debug!(event = event_names::LEDGER_MUTATED, stage = %Stage::Ledger, op = "declare_max", %process, %resource, n);
        Ok(())
    }

    /// Remove a process with all of its edges; held instances return to the pool.
    ///
    /// Returns the allocations the process held.
    pub fn remove_process(&mut self, id: &ProcessId) -> Result<BTreeMap<ResourceId, u32>> {
        if self.processes.remove(id).is_none() {
            return rejected("remove_process", Error::unknown_process(id.as_str()));
        }
        let released = self.allocations.remove(id).unwrap_or_default();
        self.requests.remove(id);
        self.max_claims.remove(id);
        debug!(
            event = event_names::LEDGER_MUTATED,
            stage = %Stage::Ledger,
            op = "remove_process",
            process = %id,
            released = released.len()
        );
        Ok(released)
    }

    /// Return every instance `id` holds to the pool and add it back onto the
    /// process's pending requests, so it resumes by re-acquiring them.
    ///
    /// The process, its declared maxima, and its classification stay.
    /// Returns the allocations released.
    pub fn roll_back(&mut self, id: &ProcessId) -> Result<BTreeMap<ResourceId, u32>> {
        if !self.processes.contains_key(id) {
            return rejected("roll_back", Error::unknown_process(id.as_str()));
        }
        let released = self.allocations.remove(id).unwrap_or_default();
        for (resource, &n) in &released {
            let pending = edge(&self.requests, id, resource);
            set_edge(&mut self.requests, id, resource, pending + n);
        }
        debug!(
            event = event_names::LEDGER_MUTATED,
            stage = %Stage::Ledger,
            op = "roll_back",
            process = %id,
            released = released.len()
        );
        Ok(released)
    }

    /// Remove a resource that has no allocation or request edges.
    ///
    /// Declared maxima on the resource are dropped with it.
    pub fn remove_resource(&mut self, id: &ResourceId) -> Result<()> {
        if !self.resources.contains_key(id) {
            return rejected("remove_resource", Error::unknown_resource(id.as_str()));
        }
        let edges = self
            .allocations
            .values()
            .chain(self.requests.values())
            .filter(|edges| edges.contains_key(id))
            .count();
        if edges > 0 {
            return rejected(
                "remove_resource",
                Error::ResourceInUse {
                    resource: id.0.clone(),
                    edges,
                },
            );
        }
        self.resources.remove(id);
        self.max_claims.retain(|_, claims| {
            claims.remove(id);
            !claims.is_empty()
        });
        debug!(event = event_names::LEDGER_MUTATED, stage = %Stage::Ledger, op = "remove_resource", resource = %id);
        Ok(())
    }

    /// Drop every process, resource, and edge.
    pub fn reset(&mut self) {
        *self = Ledger::default();
        debug!(event = event_names::LEDGER_MUTATED, stage = %Stage::Ledger, op = "reset");
    }

    fn check_endpoints(&self, process: &ProcessId, resource: &ResourceId) -> Result<()> {
        if !self.processes.contains_key(process) {
            return Err(Error::unknown_process(process.as_str()));
        }
        if !self.resources.contains_key(resource) {
            return Err(Error::unknown_resource(resource.as_str()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty() && self.resources.is_empty()
    }

    pub fn contains_process(&self, id: &ProcessId) -> bool {
        self.processes.contains_key(id)
    }

    pub fn contains_resource(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Processes in ascending id order with their classification.
    pub fn processes(&self) -> impl Iterator<Item = (&ProcessId, Option<Classification>)> {
        self.processes.iter().map(|(id, class)| (id, *class))
    }

    /// Resources in ascending id order with their total instance count.
    pub fn resources(&self) -> impl Iterator<Item = (&ResourceId, u32)> {
        self.resources.iter().map(|(id, total)| (id, *total))
    }

    pub fn classification(&self, id: &ProcessId) -> Option<Classification> {
        self.processes.get(id).copied().flatten()
    }

    pub fn total(&self, resource: &ResourceId) -> Option<u32> {
        self.resources.get(resource).copied()
    }

    /// Sum of instances of `resource` held across all processes.
    pub fn allocated(&self, resource: &ResourceId) -> u32 {
        self.allocations
            .values()
            .filter_map(|edges| edges.get(resource))
            .sum()
    }

    /// Unallocated instances of `resource` (zero for unknown resources).
    pub fn available(&self, resource: &ResourceId) -> u32 {
        self.total(resource)
            .map_or(0, |total| total.saturating_sub(self.allocated(resource)))
    }

    /// Instances of `resource` held by `process`.
    pub fn allocation(&self, resource: &ResourceId, process: &ProcessId) -> u32 {
        edge(&self.allocations, process, resource)
    }

    /// Pending request of `process` for `resource`.
    pub fn pending_request(&self, process: &ProcessId, resource: &ResourceId) -> u32 {
        edge(&self.requests, process, resource)
    }

    /// Declared maximum of `process` for `resource`, if any.
    pub fn declared_max(&self, process: &ProcessId, resource: &ResourceId) -> Option<u32> {
        self.max_claims
            .get(process)
            .and_then(|claims| claims.get(resource))
            .copied()
    }

    /// Allocation edges of `process`, ascending by resource.
    pub fn held(&self, process: &ProcessId) -> impl Iterator<Item = (&ResourceId, u32)> {
        self.allocations
            .get(process)
            .into_iter()
            .flat_map(|edges| edges.iter().map(|(r, n)| (r, *n)))
    }

    /// Request edges of `process`, ascending by resource.
    pub fn requested(&self, process: &ProcessId) -> impl Iterator<Item = (&ResourceId, u32)> {
        self.requests
            .get(process)
            .into_iter()
            .flat_map(|edges| edges.iter().map(|(r, n)| (r, *n)))
    }

    pub fn has_requests(&self) -> bool {
        !self.requests.is_empty()
    }

    /// Point-in-time copy for lock-free analysis.
    pub fn snapshot(&self) -> Ledger {
        self.clone()
    }

    /// Dense matrix view with processes and resources in ascending id order.
    pub fn matrix(&self) -> AllocationMatrix {
        let processes: Vec<ProcessId> = self.processes.keys().cloned().collect();
        let resources: Vec<ResourceId> = self.resources.keys().cloned().collect();
        let total: Vec<u32> = self.resources.values().copied().collect();

        let row = |map: &BTreeMap<ProcessId, Edges>, p: &ProcessId| -> Vec<u32> {
            resources.iter().map(|r| edge(map, p, r)).collect()
        };
        let allocation: Vec<Vec<u32>> = processes.iter().map(|p| row(&self.allocations, p)).collect();
        let request: Vec<Vec<u32>> = processes.iter().map(|p| row(&self.requests, p)).collect();
        let max: Vec<Vec<u32>> = processes
            .iter()
            .enumerate()
            .map(|(i, p)| {
                resources
                    .iter()
                    .enumerate()
                    .map(|(j, r)| {
                        let implied = allocation[i][j] + request[i][j];
                        self.declared_max(p, r).map_or(implied, |d| d.max(implied))
                    })
                    .collect()
            })
            .collect();
        let available: Vec<u32> = total
            .iter()
            .enumerate()
            .map(|(j, t)| t.saturating_sub(allocation.iter().map(|a| a[j]).sum()))
            .collect();

        AllocationMatrix {
            processes,
            resources,
            total,
            available,
            allocation,
            request,
            max,
        }
    }

    /// Render-ready node and link lists for the graph view.
    pub fn graph(&self) -> GraphData {
        let mut nodes = Vec::with_capacity(self.processes.len() + self.resources.len());
        for (id, class) in &self.processes {
            nodes.push(GraphNodeData {
                id: id.0.clone(),
                kind: EntityKind::Process,
                classification: *class,
                instances: None,
                available: None,
            });
        }
        for (id, total) in &self.resources {
            nodes.push(GraphNodeData {
                id: id.0.clone(),
                kind: EntityKind::Resource,
                classification: None,
                instances: Some(*total),
                available: Some(self.available(id)),
            });
        }

        let mut links = Vec::new();
        for (process, edges) in &self.allocations {
            for (resource, amount) in edges {
                links.push(GraphLink {
                    source: resource.0.clone(),
                    target: process.0.clone(),
                    kind: LinkKind::Allocation,
                    amount: *amount,
                });
            }
        }
        for (process, edges) in &self.requests {
            for (resource, amount) in edges {
                links.push(GraphLink {
                    source: process.0.clone(),
                    target: resource.0.clone(),
                    kind: LinkKind::Request,
                    amount: *amount,
                });
            }
        }

        GraphData { nodes, links }
    }
}

/// Dense view of a ledger for the reduction algorithms.
///
/// Row `i` is `processes[i]`, column `j` is `resources[j]`. `max` is the
/// declared maximum where one exists, floored at held + requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationMatrix {
    pub processes: Vec<ProcessId>,
    pub resources: Vec<ResourceId>,
    pub total: Vec<u32>,
    pub available: Vec<u32>,
    pub allocation: Vec<Vec<u32>>,
    pub request: Vec<Vec<u32>>,
    pub max: Vec<Vec<u32>>,
}

/// Outcome of one graph reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    /// Row indices in the order they finished.
    pub order: Vec<usize>,
    pub finished: Vec<bool>,
    /// Pool after every finishable process released its holdings.
    pub work: Vec<u32>,
}

impl Reduction {
    pub fn unfinished(&self) -> impl Iterator<Item = usize> + '_ {
        self.finished
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(i, _)| i)
    }

    pub fn is_complete(&self) -> bool {
        self.finished.iter().all(|done| *done)
    }
}

impl AllocationMatrix {
    /// `max - allocation` per process and resource.
    pub fn need(&self) -> Vec<Vec<u32>> {
        self.max
            .iter()
            .zip(&self.allocation)
            .map(|(max, alloc)| {
                max.iter()
                    .zip(alloc)
                    .map(|(m, a)| m.saturating_sub(*a))
                    .collect()
            })
            .collect()
    }

    /// Repeatedly finish the lowest-indexed process whose `demand` row fits
    /// in the pool, releasing its holdings, until none fits.
    ///
    /// O(n² · m): each outer pass finishes one process or stops.
    pub fn reduce(&self, demand: &[Vec<u32>]) -> Reduction {
        let n = self.processes.len();
        let mut work = self.available.clone();
        let mut finished = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while let Some(i) =
            (0..n).find(|&i| !finished[i] && demand[i].iter().zip(&work).all(|(d, w)| d <= w))
        {
            for (w, held) in work.iter_mut().zip(&self.allocation[i]) {
                *w += held;
            }
            finished[i] = true;
            order.push(i);
            tracing::trace!(
                event = event_names::DETECT_PASS,
                stage = %Stage::Detect,
                process = %self.processes[i],
                finished = order.len(),
                "process finishable"
            );
        }

        Reduction {
            order,
            finished,
            work,
        }
    }
}

/// Node of the rendered graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNodeData {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Allocation,
    Request,
}

/// Directed edge of the rendered graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: LinkKind,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNodeData>,
    pub links: Vec<GraphLink>,
}

/// Ledger shared between one writer at a time and many readers.
///
/// Mutators run under the write lock for their whole duration. Analyses
/// clone a snapshot under a brief read lock and compute without any lock.
#[derive(Debug, Clone, Default)]
pub struct SharedLedger {
    inner: Arc<RwLock<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        SharedLedger {
            inner: Arc::new(RwLock::new(ledger)),
        }
    }

    // A poisoned lock still guards a consistent ledger: mutators validate
    // before writing, so a panic cannot leave a half-applied edge.
    fn read(&self) -> RwLockReadGuard<'_, Ledger> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Run one or more mutators atomically with respect to other writers.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut Ledger) -> Result<T>) -> Result<T> {
        let mut guard = self.write();
        f(&mut guard)
    }

    /// Clone the current state under a shared lock.
    pub fn snapshot(&self) -> Ledger {
        self.read().clone()
    }
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

    fn ledger() -> Ledger {
        let mut l = Ledger::new();
        l.add_process("P1", None).unwrap();
        l.add_process("P2", Some(Classification::System)).unwrap();
        l.add_resource("R1", 2).unwrap();
        l.add_resource("R2", 1).unwrap();
        l
    }

    #[test]
    fn test_allocate_merges_and_tracks_available() {
        let mut l = ledger();
        l.allocate(&r("R1"), &p("P1"), 1).unwrap();
        l.allocate(&r("R1"), &p("P1"), 1).unwrap();
        assert_eq!(l.allocation(&r("R1"), &p("P1")), 2);
        assert_eq!(l.available(&r("R1")), 0);
        assert_eq!(l.held(&p("P1")).count(), 1);
    }

    #[test]
    fn test_allocate_beyond_total_rejected_without_change() {
        let mut l = ledger();
        l.allocate(&r("R1"), &p("P1"), 1).unwrap();
        let before = l.clone();
        let err = l.allocate(&r("R1"), &p("P2"), 2).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { available: 1, total: 2, .. }));
        assert_eq!(l, before);
    }

    #[test]
    fn test_unknown_endpoints_rejected() {
        let mut l = ledger();
        assert!(matches!(
            l.allocate(&r("R9"), &p("P1"), 1),
            Err(Error::UnknownEntity { kind: EntityKind::Resource, .. })
        ));
        assert!(matches!(
            l.request(&p("P9"), &r("R1"), 1),
            Err(Error::UnknownEntity { kind: EntityKind::Process, .. })
        ));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut l = ledger();
        assert!(matches!(
            l.allocate(&r("R1"), &p("P1"), 0),
            Err(Error::NonPositiveAmount { amount: 0 })
        ));
        assert!(matches!(
            l.add_resource("R3", 0),
            Err(Error::NonPositiveAmount { .. })
        ));
    }

    #[test]
    fn test_duplicate_entities_rejected() {
        let mut l = ledger();
        assert!(matches!(
            l.add_process("P1", None),
            Err(Error::DuplicateEntity { .. })
        ));
        assert!(matches!(
            l.add_resource("R1", 4),
            Err(Error::DuplicateEntity { .. })
        ));
    }

    #[test]
    fn test_request_replaces_pending_amount() {
        let mut l = ledger();
        l.request(&p("P1"), &r("R1"), 1).unwrap();
        l.request(&p("P1"), &r("R1"), 2).unwrap();
        assert_eq!(l.pending_request(&p("P1"), &r("R1")), 2);
    }

    #[test]
    fn test_request_beyond_total_rejected() {
        let mut l = ledger();
        l.allocate(&r("R1"), &p("P1"), 1).unwrap();
        assert!(matches!(
            l.request(&p("P1"), &r("R1"), 2),
            Err(Error::CapacityExceeded { .. })
        ));
        l.request(&p("P1"), &r("R1"), 1).unwrap();
    }

    #[test]
    fn test_allocate_consumes_pending_request() {
        let mut l = ledger();
        l.request(&p("P1"), &r("R1"), 2).unwrap();
        l.allocate(&r("R1"), &p("P1"), 1).unwrap();
        assert_eq!(l.pending_request(&p("P1"), &r("R1")), 1);
        l.allocate(&r("R1"), &p("P1"), 1).unwrap();
        assert_eq!(l.pending_request(&p("P1"), &r("R1")), 0);
        assert!(!l.has_requests());
    }

    #[test]
    fn test_release_and_over_release() {
        let mut l = ledger();
        l.allocate(&r("R1"), &p("P1"), 2).unwrap();
        l.release(&r("R1"), &p("P1"), 1).unwrap();
        assert_eq!(l.available(&r("R1")), 1);
        assert!(matches!(
            l.release(&r("R1"), &p("P1"), 2),
            Err(Error::OverRelease { held: 1, amount: 2, .. })
        ));
        l.release(&r("R1"), &p("P1"), 1).unwrap();
        assert_eq!(l.held(&p("P1")).count(), 0);
    }

    #[test]
    fn test_cancel_request_returns_pending() {
        let mut l = ledger();
        l.request(&p("P2"), &r("R2"), 1).unwrap();
        assert_eq!(l.cancel_request(&p("P2"), &r("R2")).unwrap(), 1);
        assert_eq!(l.cancel_request(&p("P2"), &r("R2")).unwrap(), 0);
    }

    #[test]
    fn test_remove_process_releases_holdings() {
        let mut l = ledger();
        l.allocate(&r("R1"), &p("P1"), 2).unwrap();
        l.request(&p("P1"), &r("R2"), 1).unwrap();
        let released = l.remove_process(&p("P1")).unwrap();
        assert_eq!(released.get(&r("R1")), Some(&2));
        assert_eq!(l.available(&r("R1")), 2);
        assert!(!l.has_requests());
        assert!(l.remove_process(&p("P1")).is_err());
    }

    #[test]
    fn test_roll_back_keeps_process_and_rerequests() {
        let mut l = ledger();
        l.allocate(&r("R1"), &p("P1"), 1).unwrap();
        l.allocate(&r("R2"), &p("P1"), 1).unwrap();
        l.request(&p("P1"), &r("R1"), 1).unwrap();
        let released = l.roll_back(&p("P1")).unwrap();
        assert_eq!(released.len(), 2);
        assert!(l.contains_process(&p("P1")));
        assert_eq!(l.held(&p("P1")).count(), 0);
        assert_eq!(l.available(&r("R1")), 2);
        assert_eq!(l.pending_request(&p("P1"), &r("R1")), 2);
        assert_eq!(l.pending_request(&p("P1"), &r("R2")), 1);
        assert!(l.roll_back(&p("P9")).is_err());
    }

    #[test]
    fn test_mutation_events_carry_ledger_stage() {
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for Captured {
            fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(data);
                Ok(data.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let mut l = ledger();
            l.allocate(&r("R2"), &p("P1"), 1).unwrap();
            assert!(l.allocate(&r("R2"), &p("P2"), 1).is_err());
        });

        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines.iter().all(|line| line.contains(r#""stage":"ledger""#)));
        assert!(lines[5].contains(r#""event":"ledger.rejected""#));
    }

    #[test]
    fn test_remove_resource_requires_no_edges() {
        let mut l = ledger();
        l.request(&p("P1"), &r("R2"), 1).unwrap();
        assert!(matches!(
            l.remove_resource(&r("R2")),
            Err(Error::ResourceInUse { edges: 1, .. })
        ));
        l.cancel_request(&p("P1"), &r("R2")).unwrap();
        l.remove_resource(&r("R2")).unwrap();
        assert!(!l.contains_resource(&r("R2")));
    }

    #[test]
    fn test_declare_max_bounds() {
        let mut l = ledger();
        l.declare_max(&p("P1"), &r("R1"), 2).unwrap();
        assert_eq!(l.declared_max(&p("P1"), &r("R1")), Some(2));
        assert!(l.declare_max(&p("P1"), &r("R1"), 3).is_err());
    }

    #[test]
    fn test_matrix_max_defaults_to_held_plus_requested() {
        let mut l = ledger();
        l.allocate(&r("R1"), &p("P1"), 1).unwrap();
        l.request(&p("P1"), &r("R1"), 1).unwrap();
        l.declare_max(&p("P2"), &r("R2"), 1).unwrap();
        let m = l.matrix();
        assert_eq!(m.processes, vec![p("P1"), p("P2")]);
        assert_eq!(m.max, vec![vec![2, 0], vec![0, 1]]);
        assert_eq!(m.need(), vec![vec![1, 0], vec![0, 1]]);
        assert_eq!(m.available, vec![1, 1]);
    }

    #[test]
    fn test_graph_links_follow_edge_direction() {
        let mut l = ledger();
        l.allocate(&r("R1"), &p("P1"), 1).unwrap();
        l.request(&p("P2"), &r("R1"), 1).unwrap();
        let graph = l.graph();
        assert_eq!(graph.nodes.len(), 4);
        assert!(graph
            .links
            .iter()
            .any(|link| link.source == "R1" && link.target == "P1" && link.kind == LinkKind::Allocation));
        assert!(graph
            .links
            .iter()
            .any(|link| link.source == "P2" && link.target == "R1" && link.kind == LinkKind::Request));
    }

    #[test]
    fn test_shared_ledger_snapshot_is_isolated() {
        let shared = SharedLedger::new(ledger());
        let before = shared.snapshot();
        shared
            .mutate(|l| l.allocate(&r("R2"), &p("P1"), 1))
            .unwrap();
        assert_eq!(before.available(&r("R2")), 1);
        assert_eq!(shared.snapshot().available(&r("R2")), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut l = ledger();
        l.allocate(&r("R1"), &p("P1"), 1).unwrap();
        l.reset();
        assert!(l.is_empty());
    }
}
