//! Process classification rules.
//!
//! Names are compared case-insensitively against the executable basename.
//! Patterns are regular expressions matched against the same basename.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Rules deciding whether a live process is Critical, System, or User.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationRules {
    /// Exact names whose termination can crash the host.
    pub critical_names: Vec<String>,
    /// Exact names of host services.
    pub system_names: Vec<String>,
    pub critical_patterns: Vec<String>,
    pub system_patterns: Vec<String>,
    /// Accounts whose processes count as System (substring, case-insensitive).
    pub system_users: Vec<String>,
    /// Executable path fragments marking System processes.
    pub system_path_markers: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for ClassificationRules {
    fn default() -> Self {
        ClassificationRules {
            critical_names: strings(&[
                "csrss.exe",
                "smss.exe",
                "wininit.exe",
                "services.exe",
                "lsass.exe",
                "winlogon.exe",
                "dwm.exe",
                "system",
                "init",
                "systemd",
                "launchd",
                "kernel_task",
            ]),
            system_names: strings(&[
                "explorer.exe",
                "svchost.exe",
                "taskhost.exe",
                "taskhostw.exe",
                "spoolsv.exe",
                "searchindexer.exe",
                "sshd",
                "dbus-daemon",
                "cron",
            ]),
            critical_patterns: Vec::new(),
            system_patterns: strings(&[r"^systemd-.+", r"^kworker/.*"]),
            system_users: strings(&["SYSTEM", "LOCAL SERVICE", "NETWORK SERVICE"]),
            system_path_markers: strings(&["System32", "/usr/sbin/"]),
        }
    }
}

impl ClassificationRules {
    pub fn validate(&self) -> Result<()> {
        for (field, patterns) in [
            ("critical_patterns", &self.critical_patterns),
            ("system_patterns", &self.system_patterns),
        ] {
            for (i, pattern) in patterns.iter().enumerate() {
                Regex::new(pattern).map_err(|e| {
                    Error::InvalidConfiguration(format!(
                        "classification.{}[{}] is not a valid regex: {}",
                        field, i, e
                    ))
                })?;
            }
        }
        Ok(())
    }
}
