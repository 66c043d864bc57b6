//! Critical / System / User classification of live processes.
//!
//! Rules come from [`ClassificationRules`] and are compiled once. Checks run
//! in a fixed order and the first hit wins:
//!
//! 1. critical name or pattern → Critical
//! 2. system name or pattern → System
//! 3. owning user contains a system account → System
//! 4. executable path contains a system marker → System
//! 5. otherwise → User
//!
//! Name comparisons use the lowercased executable basename.

use std::collections::{BTreeMap, HashSet};

use pl_common::{Classification, ClassificationRules, Error, ProcessId, ProcessSnapshot, Result};
use regex::Regex;
use tracing::trace;

/// Per-process classification supplied to the recovery selector.
pub type ClassificationMap = BTreeMap<ProcessId, Classification>;

/// Compiled classification rules.
#[derive(Debug, Clone)]
pub struct Classifier {
    critical_names: HashSet<String>,
    system_names: HashSet<String>,
    critical_patterns: Vec<Regex>,
    system_patterns: Vec<Regex>,
    system_users: Vec<String>,
    system_path_markers: Vec<String>,
}

fn compile(patterns: &[String], field: &str) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .enumerate()
        .map(|(i, pattern)| {
            Regex::new(pattern).map_err(|e| {
                Error::InvalidConfiguration(format!(
                    "classification.{field}[{i}] is not a valid regex: {e}"
                ))
            })
        })
        .collect()
}

fn lowered(items: &[String]) -> HashSet<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

impl Classifier {
    pub fn new(rules: &ClassificationRules) -> Result<Self> {
        Ok(Classifier {
            critical_names: lowered(&rules.critical_names),
            system_names: lowered(&rules.system_names),
            critical_patterns: compile(&rules.critical_patterns, "critical_patterns")?,
            system_patterns: compile(&rules.system_patterns, "system_patterns")?,
            system_users: rules.system_users.iter().map(|u| u.to_uppercase()).collect(),
            system_path_markers: rules
                .system_path_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
        })
    }

    /// Classify by executable name alone.
    ///
    /// Name lists match the basename. Patterns match either the basename or
    /// the full name, so kernel threads like `kworker/0:1` stay reachable.
    pub fn classify_name(&self, name: &str) -> Option<Classification> {
        let full = name.to_lowercase();
        let base = basename(&full);
        if base.is_empty() {
            return None;
        }
        let matches = |patterns: &[Regex]| {
            patterns
                .iter()
                .any(|re| re.is_match(base) || re.is_match(&full))
        };
        if self.critical_names.contains(base) || matches(self.critical_patterns.as_slice()) {
            return Some(Classification::Critical);
        }
        if self.system_names.contains(base) || matches(self.system_patterns.as_slice()) {
            return Some(Classification::System);
        }
        None
    }

    pub fn classify(&self, snapshot: &ProcessSnapshot) -> Classification {
        let class = self
            .classify_name(&snapshot.name)
            .or_else(|| {
                let user = snapshot.user.as_deref()?.to_uppercase();
                self.system_users
                    .iter()
                    .any(|account| user.contains(account.as_str()))
                    .then_some(Classification::System)
            })
            .or_else(|| {
                let exe = snapshot.exe.as_deref()?.to_lowercase();
                self.system_path_markers
                    .iter()
                    .any(|marker| exe.contains(marker.as_str()))
                    .then_some(Classification::System)
            })
            .unwrap_or(Classification::User);
        trace!(process = %snapshot.id, name = %snapshot.name, %class, "classified");
        class
    }

    pub fn classify_all(&self, snapshots: &[ProcessSnapshot]) -> ClassificationMap {
        snapshots
            .iter()
            .map(|s| (s.id.clone(), self.classify(s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(&ClassificationRules::default()).unwrap()
    }

    fn named(name: &str) -> ProcessSnapshot {
        ProcessSnapshot {
            name: name.to_string(),
            ..ProcessSnapshot::new("100")
        }
    }

    #[test]
    fn test_critical_names_case_insensitive() {
        let c = classifier();
        assert_eq!(c.classify(&named("LSASS.EXE")), Classification::Critical);
        assert_eq!(c.classify(&named("systemd")), Classification::Critical);
    }

    #[test]
    fn test_system_name_and_pattern() {
        let c = classifier();
        assert_eq!(c.classify(&named("svchost.exe")), Classification::System);
        assert_eq!(c.classify(&named("systemd-journald")), Classification::System);
    }

    #[test]
    fn test_system_user_and_path() {
        let c = classifier();
        let by_user = ProcessSnapshot {
            user: Some("NT AUTHORITY\\SYSTEM".to_string()),
            ..named("updater.exe")
        };
        assert_eq!(c.classify(&by_user), Classification::System);

        let by_path = ProcessSnapshot {
            exe: Some("C:\\Windows\\system32\\conhost.exe".to_string()),
            ..named("conhost.exe")
        };
        assert_eq!(c.classify(&by_path), Classification::System);
    }

    #[test]
    fn test_plain_process_is_user() {
        let c = classifier();
        let snap = ProcessSnapshot {
            user: Some("alice".to_string()),
            exe: Some("/home/alice/bin/editor".to_string()),
            ..named("editor")
        };
        assert_eq!(c.classify(&snap), Classification::User);
    }

    #[test]
    fn test_name_with_path_uses_basename() {
        let c = classifier();
        assert_eq!(c.classify_name("/sbin/init"), Some(Classification::Critical));
    }

    #[test]
    fn test_kernel_thread_matches_full_name_pattern() {
        let c = classifier();
        assert_eq!(c.classify_name("kworker/0:1"), Some(Classification::System));
        assert_eq!(c.classify_name("kworker/u8:2-events"), Some(Classification::System));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let rules = ClassificationRules {
            critical_patterns: vec!["(".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            Classifier::new(&rules),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_classify_all_keys_by_id() {
        let c = classifier();
        let map = c.classify_all(&[named("csrss.exe")]);
        assert_eq!(map[&ProcessId::from("100")], Classification::Critical);
    }
}
