//! Risk scoring configuration.
//!
//! The named options mirror the deployment surface:
//!
//! ```json
//! {
//!   "thread_weight": 30, "status_weight": 25, "memory_weight": 20,
//!   "handle_weight": 15, "pattern_weight": 10,
//!   "low_high_boundary": 34, "medium_high_boundary": 67
//! }
//! ```
//!
//! Each factor maps its raw value to a fraction of its weight through a
//! bucket table. Thresholds are data, so retuning never touches code.

use serde::{Deserialize, Serialize};

use crate::categories::ProcessStatus;
use crate::error::{Error, Result};

/// One step of a bucket table: values `>= at` earn `fraction` of the weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub at: f64,
    pub fraction: f64,
}

/// Monotonic step function from a raw factor value to `[0, 1]`.
///
/// Values below the first threshold earn nothing. Thresholds must ascend and
/// fractions must not decrease, which keeps every sub-score monotonic in its
/// input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketTable(pub Vec<Bucket>);

impl BucketTable {
    pub fn new(steps: &[(f64, f64)]) -> Self {
        BucketTable(
            steps
                .iter()
                .map(|&(at, fraction)| Bucket { at, fraction })
                .collect(),
        )
    }

    /// Fraction earned by `value`.
    pub fn fraction_for(&self, value: f64) -> f64 {
        self.0
            .iter()
            .take_while(|b| value >= b.at)
            .last()
            .map_or(0.0, |b| b.fraction)
    }

    fn validate(&self, field: &str) -> Result<()> {
        let mut prev: Option<&Bucket> = None;
        for (i, bucket) in self.0.iter().enumerate() {
            if !bucket.at.is_finite() || !bucket.fraction.is_finite() {
                return Err(Error::InvalidConfiguration(format!(
                    "{}[{}] must be finite",
                    field, i
                )));
            }
            if !(0.0..=1.0).contains(&bucket.fraction) {
                return Err(Error::InvalidConfiguration(format!(
                    "{}[{}].fraction must be in [0, 1] (got {})",
                    field, i, bucket.fraction
                )));
            }
            if let Some(p) = prev {
                if bucket.at <= p.at {
                    return Err(Error::InvalidConfiguration(format!(
                        "{} thresholds must ascend ({} after {})",
                        field, bucket.at, p.at
                    )));
                }
                if bucket.fraction < p.fraction {
                    return Err(Error::InvalidConfiguration(format!(
                        "{} fractions must not decrease ({} after {})",
                        field, bucket.fraction, p.fraction
                    )));
                }
            }
            prev = Some(bucket);
        }
        Ok(())
    }
}

/// Per-status fraction of the status weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTable {
    pub running: f64,
    pub sleeping: f64,
    pub waiting: f64,
    pub disk_sleep: f64,
    pub stopped: f64,
    pub zombie: f64,
    pub unknown: f64,
}

impl Default for StatusTable {
    fn default() -> Self {
        StatusTable {
            running: 0.0,
            sleeping: 0.4,
            waiting: 1.0,
            disk_sleep: 0.8,
            stopped: 0.6,
            zombie: 0.6,
            unknown: 0.2,
        }
    }
}

impl StatusTable {
    pub fn fraction_for(&self, status: ProcessStatus) -> f64 {
        match status {
            ProcessStatus::Running => self.running,
            ProcessStatus::Sleeping => self.sleeping,
            ProcessStatus::Waiting => self.waiting,
            ProcessStatus::DiskSleep => self.disk_sleep,
            ProcessStatus::Stopped => self.stopped,
            ProcessStatus::Zombie => self.zombie,
            ProcessStatus::Unknown => self.unknown,
        }
    }

    fn validate(&self) -> Result<()> {
        for &status in ProcessStatus::all() {
            let fraction = self.fraction_for(status);
            if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
                return Err(Error::InvalidConfiguration(format!(
                    "buckets.status.{} must be in [0, 1] (got {})",
                    status, fraction
                )));
            }
        }
        Ok(())
    }
}

/// Bucket tables for every scored factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorBuckets {
    /// Thread count.
    pub threads: BucketTable,
    /// Resident memory in MiB.
    pub memory_mib: BucketTable,
    /// Open handle count.
    pub handles: BucketTable,
    /// Activity irregularity in `[0, 1]`.
    pub pattern: BucketTable,
    pub status: StatusTable,
}

impl Default for FactorBuckets {
    fn default() -> Self {
        FactorBuckets {
            threads: BucketTable::new(&[
                (2.0, 0.2),
                (5.0, 0.4),
                (10.0, 0.6),
                (25.0, 0.8),
                (50.0, 1.0),
            ]),
            memory_mib: BucketTable::new(&[
                (64.0, 0.2),
                (256.0, 0.4),
                (512.0, 0.6),
                (1024.0, 0.8),
                (2048.0, 1.0),
            ]),
            handles: BucketTable::new(&[
                (10.0, 0.2),
                (50.0, 0.4),
                (100.0, 0.6),
                (500.0, 0.8),
                (1000.0, 1.0),
            ]),
            pattern: BucketTable::new(&[
                (0.1, 0.2),
                (0.25, 0.4),
                (0.5, 0.6),
                (0.75, 0.8),
                (1.0, 1.0),
            ]),
            status: StatusTable::default(),
        }
    }
}

/// Weights, level boundaries, and bucket tables for the risk scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub thread_weight: f64,
    pub status_weight: f64,
    pub memory_weight: f64,
    pub handle_weight: f64,
    pub pattern_weight: f64,
    /// Scores below this are LOW.
    pub low_high_boundary: f64,
    /// Scores at or above this are HIGH.
    pub medium_high_boundary: f64,
    pub buckets: FactorBuckets,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            thread_weight: 30.0,
            status_weight: 25.0,
            memory_weight: 20.0,
            handle_weight: 15.0,
            pattern_weight: 10.0,
            low_high_boundary: 34.0,
            medium_high_boundary: 67.0,
            buckets: FactorBuckets::default(),
        }
    }
}

impl RiskConfig {
    /// Sum of all factor weights.
    pub fn total_weight(&self) -> f64 {
        self.thread_weight
            + self.status_weight
            + self.memory_weight
            + self.handle_weight
            + self.pattern_weight
    }

    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("thread_weight", self.thread_weight),
            ("status_weight", self.status_weight),
            ("memory_weight", self.memory_weight),
            ("handle_weight", self.handle_weight),
            ("pattern_weight", self.pattern_weight),
        ];
        for (name, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::InvalidConfiguration(format!(
                    "{} must be a non-negative number (got {})",
                    name, weight
                )));
            }
        }
        if self.total_weight() <= 0.0 {
            return Err(Error::InvalidConfiguration(
                "at least one factor weight must be positive".to_string(),
            ));
        }

        let low = self.low_high_boundary;
        let high = self.medium_high_boundary;
        if !low.is_finite() || !(0.0..=100.0).contains(&low) {
            return Err(Error::InvalidConfiguration(format!(
                "low_high_boundary must be in [0, 100] (got {})",
                low
            )));
        }
        if !high.is_finite() || !(0.0..=100.0).contains(&high) {
            return Err(Error::InvalidConfiguration(format!(
                "medium_high_boundary must be in [0, 100] (got {})",
                high
            )));
        }
        if low > high {
            return Err(Error::InvalidConfiguration(format!(
                "low_high_boundary ({}) must not exceed medium_high_boundary ({})",
                low, high
            )));
        }

        self.buckets.threads.validate("buckets.threads")?;
        self.buckets.memory_mib.validate("buckets.memory_mib")?;
        self.buckets.handles.validate("buckets.handles")?;
        self.buckets.pattern.validate("buckets.pattern")?;
        self.buckets.status.validate()?;
        Ok(())
    }
}
