//! CLI end-to-end tests for pl-core.
//!
//! Every test runs the real binary against the JSON fixtures in
//! `tests/fixtures/` with an isolated config directory, and checks stdout
//! payloads and exit codes.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Get a Command for the pl-core binary that ignores any user config.
fn pl_core(config_home: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pl-core").expect("pl-core binary should exist");
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("PREDLOCK_CONFIG")
        .env("PL_LOG", "off")
        .env_remove("RUST_LOG");
    cmd
}

fn run_json(args: &[&str], expected_code: i32) -> Value {
    let home = tempfile::tempdir().unwrap();
    let output = pl_core(&home).args(args).assert().code(expected_code);
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    serde_json::from_str(&stdout).expect("stdout should be a JSON envelope")
}

// ============================================================================
// Analysis commands
// ============================================================================

mod analysis {
    use super::*;

    #[test]
    fn detect_reports_cycle_and_exits_detected() {
        let path = fixture("two_process_cycle.json");
        let json = run_json(&["detect", path.to_str().unwrap()], 1);
        assert_eq!(json["command"], "detect");
        assert!(json["run_id"].as_str().unwrap().starts_with("run-"));
        assert_eq!(json["result"]["deadlocked"], true);
        assert_eq!(json["result"]["participants"], serde_json::json!(["P1", "P2"]));
        assert_eq!(
            json["result"]["message"],
            "Deadlock detected! Cycle: P1 → R2 → P2 → R1 → P1"
        );
    }

    #[test]
    fn detect_clean_scenario_exits_zero() {
        let path = fixture("single_holder.json");
        let json = run_json(&["detect", path.to_str().unwrap()], 0);
        assert_eq!(json["result"]["deadlocked"], false);
    }

    #[test]
    fn safety_returns_sequence() {
        let path = fixture("single_holder.json");
        let json = run_json(&["safety", path.to_str().unwrap()], 0);
        assert_eq!(json["result"]["is_safe"], true);
        assert_eq!(json["result"]["safe_sequence"], serde_json::json!(["P1"]));
    }

    #[test]
    fn safety_dining_philosophers_unsafe() {
        let path = fixture("dining_philosophers.json");
        let json = run_json(&["safety", path.to_str().unwrap()], 1);
        assert_eq!(json["result"]["is_safe"], false);
        assert_eq!(json["result"]["first_blocking_process"], "P1");
    }

    #[test]
    fn what_if_unsafe_grant_is_reported() {
        let path = fixture("staged_grant.json");
        let json = run_json(
            &[
                "what-if",
                path.to_str().unwrap(),
                "--process",
                "P1",
                "--resource",
                "R2",
                "--amount",
                "1",
            ],
            1,
        );
        assert_eq!(json["result"]["is_safe"], false);
        assert_eq!(json["result"]["hypothetical"]["process"], "P1");
    }

    #[test]
    fn what_if_beyond_pool_has_reason() {
        let path = fixture("staged_grant.json");
        let json = run_json(
            &[
                "what-if",
                path.to_str().unwrap(),
                "--process",
                "P1",
                "--resource",
                "R1",
            ],
            1,
        );
        assert!(json["result"]["reason"]
            .as_str()
            .unwrap()
            .starts_with("insufficient available"));
    }

    #[test]
    fn graph_emits_nodes_and_links() {
        let path = fixture("two_process_cycle.json");
        let json = run_json(&["graph", path.to_str().unwrap()], 0);
        assert_eq!(json["result"]["nodes"].as_array().unwrap().len(), 4);
        assert_eq!(json["result"]["links"].as_array().unwrap().len(), 4);
    }
}

// ============================================================================
// Recovery and risk
// ============================================================================

mod recovery {
    use super::*;

    #[test]
    fn recover_ranks_options() {
        let path = fixture("two_process_cycle.json");
        let json = run_json(&["recover", path.to_str().unwrap()], 1);
        let recs = json["result"]["recommendations"].as_array().unwrap();
        assert_eq!(recs.len(), 4);
        assert_eq!(recs[0]["target"], "P1");
        assert_eq!(recs[0]["action"], "terminate");
        assert!(json["result"].get("applied").is_none());
    }

    #[test]
    fn recover_apply_clears_deadlock() {
        let path = fixture("two_process_cycle.json");
        let json = run_json(&["recover", path.to_str().unwrap(), "--apply"], 0);
        assert_eq!(json["result"]["applied"]["state"], "applied");
        assert_eq!(json["result"]["after"]["deadlocked"], false);
    }

    #[test]
    fn critical_participant_is_never_terminated() {
        let path = fixture("critical_cycle.json");
        let json = run_json(&["recover", path.to_str().unwrap()], 1);
        for rec in json["result"]["recommendations"].as_array().unwrap() {
            if rec["target"] == "P1" {
                assert_ne!(rec["action"], "terminate");
                assert_eq!(rec["eligible"], false);
            }
        }
    }

    #[test]
    fn risk_flags_runaway_process() {
        let path = fixture("snapshots.json");
        let json = run_json(&["risk", path.to_str().unwrap()], 1);
        let records = json["result"]["records"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        let runaway = records.iter().find(|r| r["process"] == "4242").unwrap();
        assert_eq!(runaway["level"], "HIGH");
        let idle = records.iter().find(|r| r["process"] == "100").unwrap();
        assert_eq!(idle["level"], "LOW");

        let recs = json["result"]["recommendations"].as_array().unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0]["action"], "terminate");
    }
}

// ============================================================================
// Output formats
// ============================================================================

mod formats {
    use super::*;

    #[test]
    fn summary_is_one_line() {
        let home = tempfile::tempdir().unwrap();
        pl_core(&home)
            .args(["--format", "summary", "detect"])
            .arg(fixture("two_process_cycle.json"))
            .assert()
            .code(1)
            .stdout(predicate::str::contains("detect: Deadlock detected!"));
    }

    #[test]
    fn markdown_has_heading() {
        let home = tempfile::tempdir().unwrap();
        pl_core(&home)
            .args(["--format", "md", "safety"])
            .arg(fixture("single_holder.json"))
            .assert()
            .success()
            .stdout(predicate::str::starts_with("# Safety check"));
    }
}

// ============================================================================
// Errors and configuration
// ============================================================================

mod errors {
    use super::*;

    #[test]
    fn unknown_command_fails() {
        let home = tempfile::tempdir().unwrap();
        pl_core(&home)
            .arg("nonexistent-command")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn over_capacity_scenario_is_args_error() {
        let home = tempfile::tempdir().unwrap();
        pl_core(&home)
            .arg("detect")
            .arg(fixture("over_capacity.json"))
            .assert()
            .code(10)
            .stderr(predicate::str::contains("\"category\": \"ledger\""))
            .stderr(predicate::str::contains("exceeds capacity"));
    }

    #[test]
    fn missing_scenario_file_is_args_error() {
        let home = tempfile::tempdir().unwrap();
        pl_core(&home)
            .args(["detect", "/nonexistent/scenario.json"])
            .assert()
            .code(10);
    }

    #[test]
    fn non_positive_what_if_amount_is_rejected() {
        let home = tempfile::tempdir().unwrap();
        pl_core(&home)
            .arg("what-if")
            .arg(fixture("staged_grant.json"))
            .args(["--process", "P1", "--resource", "R2", "--amount", "0"])
            .assert()
            .code(10)
            .stderr(predicate::str::contains("amount must be positive"));
    }

    #[test]
    fn unknown_process_in_what_if_is_rejected() {
        let home = tempfile::tempdir().unwrap();
        pl_core(&home)
            .arg("what-if")
            .arg(fixture("staged_grant.json"))
            .args(["--process", "P9", "--resource", "R2"])
            .assert()
            .code(10)
            .stderr(predicate::str::contains("unknown process P9"));
    }

    #[test]
    fn invalid_config_is_config_error() {
        let home = tempfile::tempdir().unwrap();
        pl_core(&home)
            .arg("--config")
            .arg(fixture("invalid_config.json"))
            .arg("check")
            .assert()
            .code(11);
    }

    #[test]
    fn check_with_defaults_succeeds() {
        let json = run_json(&["check"], 0);
        assert_eq!(json["result"]["status"], "ok");
        assert_eq!(json["result"]["source"]["resolution"], "default");
    }

    #[test]
    fn xdg_config_is_picked_up() {
        let home = tempfile::tempdir().unwrap();
        let dir = home.path().join("predlock");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.json"), r#"{"risk": {"pattern_weight": 5}}"#).unwrap();

        let output = pl_core(&home).arg("check").assert().success();
        let json: Value = serde_json::from_slice(&output.get_output().stdout).unwrap();
        assert_eq!(json["result"]["source"]["resolution"], "xdg_config");
        assert_eq!(json["result"]["risk"]["pattern_weight"], 5.0);
    }
}
