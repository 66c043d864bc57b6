//! JSON scenario documents.
//!
//! A scenario lists processes, resources, and edges; [`Scenario::build`]
//! replays it through the ledger mutators in document order, so an invalid
//! scenario fails with exactly the error the mutator would have returned.
//!
//! ```json
//! {
//!   "processes": [{ "id": "P1" }, { "id": "P2", "classification": "critical" }],
//!   "resources": [{ "id": "R1", "instances": 1 }],
//!   "allocations": [{ "resource": "R1", "process": "P1" }],
//!   "requests": [{ "process": "P2", "resource": "R1", "amount": 1 }]
//! }
//! ```
//!
//! Amounts default to 1.

use std::path::Path;

use pl_common::{Classification, Error, ProcessId, ProcessSnapshot, ResourceId, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::{ClassificationMap, Classifier};
use crate::ledger::Ledger;

fn one() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub id: ProcessId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub id: ResourceId,
    #[serde(default = "one")]
    pub instances: i64,
}

/// An allocation, request, or declared maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub process: ProcessId,
    pub resource: ResourceId,
    #[serde(default = "one")]
    pub amount: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub processes: Vec<ProcessSpec>,
    pub resources: Vec<ResourceSpec>,
    pub allocations: Vec<EdgeSpec>,
    pub requests: Vec<EdgeSpec>,
    pub max_need: Vec<EdgeSpec>,
    /// Live attributes for risk scoring and impact estimates.
    pub snapshots: Vec<ProcessSnapshot>,
}

/// Narrow a document amount on `resource` to a ledger amount.
fn amount(n: i64, resource: &ResourceId) -> Result<u32> {
    if n <= 0 {
        return Err(Error::NonPositiveAmount { amount: n });
    }
    u32::try_from(n).map_err(|_| Error::CapacityExceeded {
        resource: resource.0.clone(),
        amount: n.unsigned_abs(),
        available: u32::MAX,
        total: u32::MAX,
    })
}

impl Scenario {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let scenario = Self::from_json(&text)?;
        debug!(
            path = %path.display(),
            processes = scenario.processes.len(),
            resources = scenario.resources.len(),
            "scenario loaded"
        );
        Ok(scenario)
    }

    /// Replay the document into a fresh ledger.
    pub fn build(&self) -> Result<Ledger> {
        let mut ledger = Ledger::new();
        for process in &self.processes {
            ledger.add_process(process.id.clone(), process.classification)?;
        }
        for resource in &self.resources {
            ledger.add_resource(resource.id.clone(), amount(resource.instances, &resource.id)?)?;
        }
        for edge in &self.max_need {
            ledger.declare_max(&edge.process, &edge.resource, amount(edge.amount, &edge.resource)?)?;
        }
        for edge in &self.allocations {
            ledger.allocate(&edge.resource, &edge.process, amount(edge.amount, &edge.resource)?)?;
        }
        for edge in &self.requests {
            ledger.request(&edge.process, &edge.resource, amount(edge.amount, &edge.resource)?)?;
        }
        Ok(ledger)
    }

    /// Explicit classifications, then rule-based ones for named snapshots.
    pub fn classifications(&self, classifier: Option<&Classifier>) -> ClassificationMap {
        let mut map: ClassificationMap = self
            .processes
            .iter()
            .filter_map(|p| p.classification.map(|c| (p.id.clone(), c)))
            .collect();
        if let Some(classifier) = classifier {
            for snap in self.snapshots.iter().filter(|s| !s.name.is_empty()) {
                map.entry(snap.id.clone())
                    .or_insert_with(|| classifier.classify(snap));
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl_common::ClassificationRules;

    const CYCLE: &str = r#"{
        "processes": [{"id": "P1"}, {"id": "P2", "classification": "critical"}],
        "resources": [{"id": "R1"}, {"id": "R2", "instances": 1}],
        "allocations": [
            {"resource": "R1", "process": "P1"},
            {"resource": "R2", "process": "P2"}
        ],
        "requests": [
            {"process": "P1", "resource": "R2"},
            {"process": "P2", "resource": "R1"}
        ]
    }"#;

    #[test]
    fn test_build_replays_edges() {
        let ledger = Scenario::from_json(CYCLE).unwrap().build().unwrap();
        assert_eq!(ledger.available(&ResourceId::from("R1")), 0);
        assert_eq!(
            ledger.pending_request(&ProcessId::from("P1"), &ResourceId::from("R2")),
            1
        );
        assert_eq!(
            ledger.classification(&ProcessId::from("P2")),
            Some(Classification::Critical)
        );
    }

    #[test]
    fn test_negative_amount_rejected() {
        let text = r#"{"processes":[{"id":"P1"}],"resources":[{"id":"R1"}],
            "allocations":[{"resource":"R1","process":"P1","amount":-2}]}"#;
        let err = Scenario::from_json(text).unwrap().build().unwrap_err();
        assert!(matches!(err, Error::NonPositiveAmount { amount: -2 }));
    }

    #[test]
    fn test_oversized_amount_is_ledger_error() {
        let text = r#"{"processes":[{"id":"P1"}],"resources":[{"id":"R1","instances":4294967296}]}"#;
        let err = Scenario::from_json(text).unwrap().build().unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { ref resource, .. } if resource == "R1"));
        assert_eq!(err.category(), pl_common::ErrorCategory::Ledger);
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let text = r#"{"processes":[{"id":"P1"}],"requests":[{"process":"P1","resource":"R9"}]}"#;
        let err = Scenario::from_json(text).unwrap().build().unwrap_err();
        assert!(matches!(err, Error::UnknownEntity { .. }));
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        assert!(matches!(Scenario::from_json("{"), Err(Error::Json(_))));
    }

    #[test]
    fn test_classifications_prefer_explicit() {
        let mut scenario = Scenario::from_json(CYCLE).unwrap();
        scenario.snapshots = vec![
            ProcessSnapshot {
                name: "explorer.exe".into(),
                ..ProcessSnapshot::new("P1")
            },
            ProcessSnapshot {
                name: "notepad.exe".into(),
                ..ProcessSnapshot::new("P2")
            },
        ];
        let classifier = Classifier::new(&ClassificationRules::default()).unwrap();
        let map = scenario.classifications(Some(&classifier));
        assert_eq!(map[&ProcessId::from("P1")], Classification::System);
        assert_eq!(map[&ProcessId::from("P2")], Classification::Critical);
    }
}
