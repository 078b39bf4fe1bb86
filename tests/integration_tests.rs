//! Integration tests for revsync
//!
//! These drive the binary end to end against temporary repository roots.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DATE: &str = "2026-01-11";

/// Helper to create a revsync Command with no ambient REVSYNC_* settings
fn revsync() -> Command {
    let mut cmd = cargo_bin_cmd!("revsync");
    for key in [
        "REVSYNC_REPO_ROOT",
        "REVSYNC_DATE",
        "REVSYNC_SESSION_DIR",
        "REVSYNC_REVIEWER_ID",
        "REVSYNC_SESSION_ID",
        "REVSYNC_LOCK_MAX_RETRIES",
        "REVSYNC_LOCK_STALE_SECS",
        "REVSYNC_WAIT_POLL_MS",
        "REVSYNC_WAIT_TIMEOUT_SECS",
        "REVSYNC_LOG",
        "REVSYNC_LOG_JSON",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

/// Helper to create a revsync Command pointed at `root` for the test date
fn revsync_in(root: &Path) -> Command {
    let mut cmd = revsync();
    cmd.env("REVSYNC_REPO_ROOT", root).env("REVSYNC_DATE", DATE);
    cmd
}

fn session_dir(root: &Path) -> PathBuf {
    root.join(".local/reports/code_reviews").join(DATE)
}

fn session_json(root: &Path) -> Value {
    let raw = fs::read_to_string(session_dir(root).join("_session.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

/// Register `reviewer_id` for `target_ref` and return its session id
fn register(root: &Path, reviewer_id: &str, target_ref: &str) -> String {
    let output = revsync_in(root)
        .args(["--json", "reviewer", "register", "--target-ref", target_ref])
        .args(["--reviewer-id", reviewer_id])
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);
    stdout_json(&output)["session_id"]
        .as_str()
        .unwrap()
        .to_string()
}

fn finalize(
    root: &Path,
    reviewer_id: &str,
    session_id: &str,
    verdict: &str,
) -> assert_cmd::assert::Assert {
    revsync_in(root)
        .args(["reviewer", "finalize", "--verdict", verdict, "--nit", "1"])
        .args(["--reviewer-id", reviewer_id, "--session-id", session_id])
        .write_stdin("# Review\n\nLooks good.")
        .assert()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_revsync_help() {
        revsync()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("reviewer"))
            .stdout(predicate::str::contains("applicator"));
    }

    #[test]
    fn test_revsync_version() {
        revsync().arg("--version").assert().success();
    }

    #[test]
    fn test_id8_is_eight_hex_chars() {
        let output = revsync().args(["id", "id8"]).output().unwrap();
        assert!(output.status.success());
        let id = String::from_utf8(output.stdout).unwrap();
        let id = id.trim();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_id_hex_respects_bytes() {
        let output = revsync()
            .args(["--json", "id", "hex", "--bytes", "16"])
            .output()
            .unwrap();
        assert!(output.status.success());
        assert_eq!(stdout_json(&output)["id"].as_str().unwrap().len(), 32);
    }

    #[test]
    fn test_id_hex_rejects_zero_bytes() {
        revsync()
            .args(["id", "hex", "--bytes", "0"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("--bytes"));
    }
}

// =============================================================================
// Reviewer/Applicator Flow
// =============================================================================

mod review_flow {
    use super::*;

    #[test]
    fn test_full_review_cycle() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sid = register(root, "r1", "main");

        revsync_in(root)
            .args(["reviewer", "update", "--status", "IN_PROGRESS", "--phase", "INGESTION"])
            .args(["--reviewer-id", "r1", "--session-id", sid.as_str()])
            .assert()
            .success()
            .stdout(predicate::str::contains("ok"));

        revsync_in(root)
            .args(["applicator", "set-status", "--initiator-status", "OBSERVING"])
            .args(["--reviewer-id", "r1", "--session-id", sid.as_str()])
            .assert()
            .success();

        finalize(root, "r1", &sid, "APPROVE").success();

        let output = revsync_in(root)
            .args(["--json", "applicator", "wait", "--timeout-secs", "0"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let outcome = stdout_json(&output);
        assert_eq!(outcome["complete"], true);
        assert_eq!(outcome["end"], "complete");

        let doc = session_json(root);
        assert_eq!(doc["schema_version"], "1.0.0");
        assert_eq!(doc["reviewers"], serde_json::json!(["r1"]));
        let entry = &doc["reviews"][0];
        assert_eq!(entry["status"], "FINISHED");
        assert_eq!(entry["verdict"], "APPROVE");
        assert_eq!(entry["current_phase"], "REPORT_WRITING");
        assert_eq!(entry["initiator_status"], "OBSERVING");
        assert_eq!(entry["counts"]["nit"], 1);

        let report_file = entry["report_file"].as_str().unwrap();
        assert!(report_file.ends_with("_main_r1.md"));
        let report = fs::read_to_string(session_dir(root).join(report_file)).unwrap();
        assert_eq!(report, "# Review\n\nLooks good.\n");
    }

    #[test]
    fn test_register_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let first = register(dir.path(), "r1", "main");
        let second = register(dir.path(), "r1", "main");
        assert_eq!(first, second);
        assert_eq!(session_json(dir.path())["reviews"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_second_reviewer_joins_open_session() {
        let dir = TempDir::new().unwrap();
        let first = register(dir.path(), "r1", "main");
        let second = register(dir.path(), "r2", "main");
        let other = register(dir.path(), "r3", "feature/x");
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(
            session_json(dir.path())["reviewers"],
            serde_json::json!(["r1", "r2", "r3"])
        );
    }

    #[test]
    fn test_double_finalize_is_rejected_and_keeps_fields() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sid = register(root, "r1", "main");
        finalize(root, "r1", &sid, "APPROVE").success();
        let before = session_json(root);

        finalize(root, "r1", &sid, "BLOCK")
            .code(6)
            .stderr(predicate::str::contains("r1"));

        assert_eq!(session_json(root), before);
        let reports = fs::read_dir(session_dir(root))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
            .count();
        assert_eq!(reports, 1);
    }

    #[test]
    fn test_update_after_terminal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sid = register(root, "r1", "main");
        revsync_in(root)
            .args(["reviewer", "update", "--status", "CANCELLED"])
            .args(["--reviewer-id", "r1", "--session-id", sid.as_str()])
            .assert()
            .success();
        revsync_in(root)
            .args(["reviewer", "update", "--status", "IN_PROGRESS"])
            .args(["--reviewer-id", "r1", "--session-id", sid.as_str()])
            .assert()
            .code(6);
    }

    #[test]
    fn test_update_requires_a_change() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sid = register(root, "r1", "main");
        revsync_in(root)
            .args(["reviewer", "update"])
            .args(["--reviewer-id", "r1", "--session-id", sid.as_str()])
            .assert()
            .code(1);
    }

    #[test]
    fn test_reviewer_ids_from_environment() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sid = register(root, "r1", "main");
        revsync_in(root)
            .env("REVSYNC_REVIEWER_ID", "r1")
            .env("REVSYNC_SESSION_ID", &sid)
            .args(["reviewer", "note", "--type", "question", "--content", "why?"])
            .assert()
            .success();
        let note = &session_json(root)["reviews"][0]["notes"][0];
        assert_eq!(note["role"], "reviewer");
        assert_eq!(note["type"], "question");
        assert_eq!(note["content"], "why?");
    }

    #[test]
    fn test_applicator_note_with_json_content() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sid = register(root, "r1", "main");
        revsync_in(root)
            .args(["applicator", "note", "--type", "applied", "--content-json"])
            .args(["--content", r#"{"finding": 2}"#])
            .args(["--reviewer-id", "r1", "--session-id", sid.as_str()])
            .assert()
            .success();
        let note = &session_json(root)["reviews"][0]["notes"][0];
        assert_eq!(note["role"], "applicator");
        assert_eq!(note["content"]["finding"], 2);
    }

    #[test]
    fn test_initiator_status_cannot_move_backwards() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sid = register(root, "r1", "main");
        revsync_in(root)
            .args(["applicator", "set-status", "--initiator-status", "RECEIVED"])
            .args(["--reviewer-id", "r1", "--session-id", sid.as_str()])
            .assert()
            .success();
        revsync_in(root)
            .args(["applicator", "set-status", "--initiator-status", "REQUESTING"])
            .args(["--reviewer-id", "r1", "--session-id", sid.as_str()])
            .assert()
            .code(6);
        assert_eq!(
            session_json(root)["reviews"][0]["initiator_status"],
            "RECEIVED"
        );
    }

    #[test]
    fn test_applicator_does_not_touch_reviewer_fields() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sid = register(root, "r1", "main");
        let before = session_json(root)["reviews"][0].clone();
        revsync_in(root)
            .args(["applicator", "set-status", "--initiator-status", "OBSERVING"])
            .args(["--reviewer-id", "r1", "--session-id", sid.as_str()])
            .assert()
            .success();
        let after = &session_json(root)["reviews"][0];
        for field in ["status", "current_phase", "verdict", "counts", "updated_at"] {
            assert_eq!(after[field], before[field], "{field} changed");
        }
    }

    #[test]
    fn test_missing_entry_is_not_found() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sid = register(root, "r1", "main");
        revsync_in(root)
            .args(["reviewer", "update", "--status", "IN_PROGRESS"])
            .args(["--reviewer-id", "ghost", "--session-id", sid.as_str()])
            .assert()
            .code(4);
    }

    #[test]
    fn test_emit_env_exports_context() {
        let dir = TempDir::new().unwrap();
        revsync_in(dir.path())
            .args(["reviewer", "register", "--target-ref", "main", "--reviewer-id", "r1"])
            .args(["--emit-env", "sh"])
            .assert()
            .success()
            .stdout(predicate::str::contains("export REVSYNC_REVIEWER_ID='r1'"))
            .stdout(predicate::str::contains("export REVSYNC_DATE='2026-01-11'"))
            .stdout(predicate::str::contains("export REVSYNC_SESSION_ID='"));
    }

    #[test]
    fn test_print_env_lines() {
        let dir = TempDir::new().unwrap();
        revsync_in(dir.path())
            .args(["reviewer", "register", "--target-ref", "main", "--reviewer-id", "r1"])
            .arg("--print-env")
            .assert()
            .success()
            .stdout(predicate::str::contains("REVSYNC_TARGET_REF=main"));
    }
}

// =============================================================================
// Waiting
// =============================================================================

mod waiting {
    use super::*;

    #[test]
    fn test_wait_times_out_with_pending() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        register(root, "r1", "main");
        let output = revsync_in(root)
            .args(["--json", "applicator", "wait", "--timeout-secs", "0"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let outcome = stdout_json(&output);
        assert_eq!(outcome["complete"], false);
        assert_eq!(outcome["end"], "timed_out");
        assert_eq!(outcome["pending"][0]["reviewer_id"], "r1");
    }

    #[test]
    fn test_wait_scoped_to_other_target_ignores_pending() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        register(root, "r1", "main");
        let sid = register(root, "r2", "feature/x");
        finalize(root, "r2", &sid, "APPROVE").success();
        let output = revsync_in(root)
            .args(["--json", "applicator", "wait", "--timeout-secs", "0"])
            .args(["--target-ref", "feature/x"])
            .output()
            .unwrap();
        assert_eq!(stdout_json(&output)["complete"], true);
    }

    #[test]
    fn test_scoped_wait_on_missing_session_times_out() {
        let dir = TempDir::new().unwrap();
        revsync_in(dir.path())
            .args(["applicator", "wait", "--timeout-secs", "0", "--poll-ms", "10"])
            .args(["--target-ref", "main"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Timed out"));
    }
}

// =============================================================================
// Locking
// =============================================================================

mod locking {
    use super::*;

    #[test]
    fn test_held_lock_blocks_writers() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        revsync_in(root)
            .args(["lock", "acquire", "--owner", "holder01"])
            .assert()
            .success();

        revsync_in(root)
            .args(["reviewer", "register", "--target-ref", "main", "--max-retries", "0"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("holder01"));

        revsync_in(root)
            .args(["lock", "release", "--owner", "intruder"])
            .assert()
            .code(3);

        revsync_in(root)
            .args(["lock", "release", "--owner", "holder01"])
            .assert()
            .success()
            .stdout(predicate::str::contains("released"));

        register(root, "r1", "main");
    }

    #[test]
    fn test_lock_status_reports_owner() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        revsync_in(root)
            .args(["lock", "acquire", "--owner", "holder01"])
            .assert()
            .success();
        let output = revsync_in(root)
            .args(["--json", "lock", "status"])
            .output()
            .unwrap();
        let status = stdout_json(&output);
        assert_eq!(status["locked"], true);
        assert_eq!(status["lock"]["owner"], "holder01");
        assert_eq!(status["lock"]["stale"], false);
    }

    #[test]
    fn test_break_requires_force_for_fresh_lock() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        revsync_in(root)
            .args(["lock", "acquire", "--owner", "holder01"])
            .assert()
            .success();
        revsync_in(root).args(["lock", "break"]).assert().code(6);
        revsync_in(root)
            .args(["lock", "break", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("holder01"));
        revsync_in(root)
            .args(["lock", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Unlocked"));
    }

    #[test]
    fn test_release_when_unlocked_is_noop() {
        let dir = TempDir::new().unwrap();
        revsync_in(dir.path())
            .args(["lock", "release", "--owner", "holder01"])
            .assert()
            .success()
            .stdout(predicate::str::contains("not held"));
    }
}

// =============================================================================
// Session Views
// =============================================================================

mod session_views {
    use super::*;

    #[test]
    fn test_show_missing_session_is_not_found() {
        let dir = TempDir::new().unwrap();
        revsync_in(dir.path())
            .args(["session", "show"])
            .assert()
            .code(4);
    }

    #[test]
    fn test_schema_major_mismatch() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sdir = session_dir(root);
        fs::create_dir_all(&sdir).unwrap();
        fs::write(
            sdir.join("_session.json"),
            r#"{"schema_version":"2.0.0","session_date":"2026-01-11","repo_root":"/x","reviewers":[],"reviews":[]}"#,
        )
        .unwrap();
        revsync_in(root)
            .args(["session", "show"])
            .assert()
            .code(5)
            .stderr(predicate::str::contains("2.0.0"));
        revsync_in(root)
            .args(["reviewer", "register", "--target-ref", "main"])
            .assert()
            .code(5);
    }

    #[test]
    fn test_malformed_session_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let sdir = session_dir(dir.path());
        fs::create_dir_all(&sdir).unwrap();
        fs::write(sdir.join("_session.json"), "{ not json").unwrap();
        revsync_in(dir.path())
            .args(["session", "show"])
            .assert()
            .code(5);
    }

    #[test]
    fn test_list_reports_filters_and_views() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sid = register(root, "r1", "main");
        register(root, "r2", "main");
        finalize(root, "r1", &sid, "REQUEST_CHANGES").success();

        let output = revsync_in(root)
            .args(["--json", "session", "list-reports", "--view", "closed"])
            .output()
            .unwrap();
        let listing = stdout_json(&output);
        assert_eq!(listing["total_reviews"], 2);
        assert_eq!(listing["matching_reviews"], 1);
        assert_eq!(listing["reviews"][0]["reviewer_id"], "r1");
        assert_eq!(listing["reviews"][0]["verdict"], "REQUEST_CHANGES");

        let output = revsync_in(root)
            .args(["--json", "session", "list", "--status", "INITIALIZING"])
            .output()
            .unwrap();
        let listing = stdout_json(&output);
        assert_eq!(listing["matching_reviews"], 1);
        assert_eq!(listing["reviews"][0]["reviewer_id"], "r2");
    }

    #[test]
    fn test_list_reports_verbose_inlines_report() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sid = register(root, "r1", "main");
        finalize(root, "r1", &sid, "APPROVE").success();
        let output = revsync_in(root)
            .args(["--json", "session", "list-reports", "--verbose-entries"])
            .args(["--only-with-report"])
            .output()
            .unwrap();
        let listing = stdout_json(&output);
        assert_eq!(
            listing["reviews"][0]["report_contents"],
            "# Review\n\nLooks good.\n"
        );
    }

    #[test]
    fn test_session_init_creates_empty_document() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        revsync_in(root)
            .args(["session", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created"));
        let doc = session_json(root);
        assert_eq!(doc["session_date"], DATE);
        assert_eq!(doc["reviews"], serde_json::json!([]));
        revsync_in(root)
            .args(["session", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_explicit_session_dir() {
        let dir = TempDir::new().unwrap();
        let custom = dir.path().join("custom");
        revsync()
            .env("REVSYNC_REPO_ROOT", dir.path())
            .env("REVSYNC_SESSION_DIR", &custom)
            .args(["reviewer", "register", "--target-ref", "main"])
            .assert()
            .success();
        assert!(custom.join("_session.json").exists());
    }
}

// =============================================================================
// Configuration Tests
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_init_then_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_str().unwrap();
        revsync()
            .args(["config", "--repo-root", root, "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created revsync.toml"));
        assert!(dir
            .path()
            .join(".local/reports/code_reviews/revsync.toml")
            .exists());
        revsync()
            .args(["config", "--repo-root", root, "init"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_show_reports_origins() {
        let dir = TempDir::new().unwrap();
        let cfg_dir = dir.path().join(".local/reports/code_reviews");
        fs::create_dir_all(&cfg_dir).unwrap();
        fs::write(cfg_dir.join("revsync.toml"), "[lock]\nmax_retries = 3\n").unwrap();
        let output = revsync()
            .env("REVSYNC_WAIT_POLL_MS", "250")
            .args(["--json", "config", "--repo-root", dir.path().to_str().unwrap()])
            .output()
            .unwrap();
        assert!(output.status.success());
        let config = stdout_json(&output);
        assert_eq!(config["settings"]["lock"]["max_retries"], 3);
        assert_eq!(config["origins"]["lock.max_retries"], "file");
        assert_eq!(config["settings"]["wait"]["poll_interval_ms"], 250);
        assert_eq!(config["origins"]["wait.poll_interval_ms"], "env");
        assert_eq!(config["origins"]["wait.timeout_secs"], "default");
    }

    #[test]
    fn test_config_validate_warns() {
        let dir = TempDir::new().unwrap();
        let cfg_dir = dir.path().join(".local/reports/code_reviews");
        fs::create_dir_all(&cfg_dir).unwrap();
        fs::write(cfg_dir.join("revsync.toml"), "[wait]\ntimeout_secs = 0\n").unwrap();
        revsync()
            .args(["config", "--repo-root", dir.path().to_str().unwrap(), "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("wait.timeout_secs"));
    }

    #[test]
    fn test_config_validate_without_file() {
        let dir = TempDir::new().unwrap();
        revsync()
            .args(["config", "--repo-root", dir.path().to_str().unwrap(), "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Using defaults"));
    }
}

// =============================================================================
// Concurrency
// =============================================================================

mod concurrency {
    use super::*;
    use chrono::NaiveDate;
    use revsync::lock::LockConfig;
    use revsync::reviewer::{RegisterRequest, ReviewerCoordinator};
    use revsync::session::{SessionSeed, SessionStore};
    use std::time::Duration;

    #[test]
    fn test_parallel_registrations_are_all_recorded() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let date = NaiveDate::from_ymd_opt(2026, 1, 11).unwrap();
        let cfg = LockConfig {
            max_retries: 40,
            stale_after: Duration::from_secs(600),
        };
        let store = SessionStore::new(session_dir(&root), cfg);
        let seed = SessionSeed::new(&root, date);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let seed = seed.clone();
                std::thread::spawn(move || {
                    let coordinator = ReviewerCoordinator::new(store, format!("owner{i}"));
                    let request = RegisterRequest {
                        target_ref: format!("ref-{i}"),
                        reviewer_id: Some(format!("rev{i}")),
                        ..Default::default()
                    };
                    coordinator.register(&seed, &request).unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let doc = store.load_required().unwrap();
        assert_eq!(doc.reviews.len(), 8);
        assert_eq!(doc.reviewers.len(), 8);
        assert!(!session_dir(&root).join("_session.json.lock").exists());
    }

    #[test]
    fn test_parallel_notes_on_one_entry() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sid = register(root, "r1", "main");

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let root = root.to_path_buf();
                let sid = sid.clone();
                std::thread::spawn(move || {
                    revsync_in(&root)
                        .args(["reviewer", "note", "--type", "progress"])
                        .args(["--content", format!("note {i}").as_str()])
                        .args(["--reviewer-id", "r1", "--session-id", sid.as_str()])
                        .args(["--max-retries", "40"])
                        .assert()
                        .success();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let notes = session_json(root)["reviews"][0]["notes"].as_array().unwrap().len();
        assert_eq!(notes, 6);
    }

    #[test]
    fn test_parallel_mixed_reviewer_processes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let workers = 6;

        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let root = root.to_path_buf();
                std::thread::spawn(move || {
                    let rid = format!("rev{i}");
                    let target = if i % 2 == 0 { "main" } else { "develop" };
                    let output = revsync_in(&root)
                        .args(["--json", "reviewer", "register", "--target-ref", target])
                        .args(["--reviewer-id", rid.as_str(), "--max-retries", "40"])
                        .output()
                        .unwrap();
                    assert!(output.status.success(), "{:?}", output);
                    let sid = stdout_json(&output)["session_id"]
                        .as_str()
                        .unwrap()
                        .to_string();

                    revsync_in(&root)
                        .args(["reviewer", "update", "--status", "IN_PROGRESS"])
                        .args(["--phase", "SYNTHESIS", "--max-retries", "40"])
                        .args(["--reviewer-id", rid.as_str(), "--session-id", sid.as_str()])
                        .assert()
                        .success();
                    revsync_in(&root)
                        .args(["reviewer", "note", "--type", "progress", "--content", "halfway"])
                        .args(["--max-retries", "40"])
                        .args(["--reviewer-id", rid.as_str(), "--session-id", sid.as_str()])
                        .assert()
                        .success();
                    if i % 3 != 2 {
                        revsync_in(&root)
                            .args(["reviewer", "finalize", "--verdict", "APPROVE"])
                            .args(["--max-retries", "40"])
                            .args(["--reviewer-id", rid.as_str(), "--session-id", sid.as_str()])
                            .write_stdin(format!("# Review by {rid}\n"))
                            .assert()
                            .success();
                    }
                    (rid, sid, i % 3 != 2)
                })
            })
            .collect();
        let results: Vec<(String, String, bool)> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let doc = session_json(root);
        let reviews = doc["reviews"].as_array().unwrap();
        assert_eq!(reviews.len(), workers);

        let mut reviewers: Vec<String> = doc["reviewers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        reviewers.sort();
        let mut expected: Vec<String> = results.iter().map(|(rid, _, _)| rid.clone()).collect();
        expected.sort();
        assert_eq!(reviewers, expected);

        for (rid, sid, finalized) in &results {
            let entry = reviews
                .iter()
                .find(|e| e["reviewer_id"] == rid.as_str() && e["session_id"] == sid.as_str())
                .unwrap();
            assert_eq!(entry["notes"].as_array().unwrap().len(), 1);
            if *finalized {
                assert_eq!(entry["status"], "FINISHED");
                let report_file = entry["report_file"].as_str().unwrap();
                let report = fs::read_to_string(session_dir(root).join(report_file)).unwrap();
                assert_eq!(report, format!("# Review by {rid}\n"));
            } else {
                assert_eq!(entry["status"], "IN_PROGRESS");
                assert_eq!(entry["current_phase"], "SYNTHESIS");
                assert!(entry["report_file"].is_null());
            }
        }
        assert!(!session_dir(root).join("_session.json.lock").exists());
    }
}
