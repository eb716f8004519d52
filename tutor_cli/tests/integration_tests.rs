//! Integration tests for the externat binary.
//!
//! These tests verify end-to-end behavior including:
//! - The start / submit session workflow
//! - Adaptive placement across runs
//! - History listing
//! - CSV rollup operations

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a test data directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the path to the CLI binary
fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("externat"))
}

/// Pull the session id out of `start` output
fn extract_session_id(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("Session: "))
        .expect("no session id in start output")
        .trim()
        .to_string()
}

fn start_session(data_dir: &std::path::Path, learner: &str, category: &str) -> String {
    let output = cli()
        .arg("start")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--learner")
        .arg(learner)
        .arg("--category")
        .arg(category)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    extract_session_id(&String::from_utf8_lossy(&output))
}

fn submit_session(data_dir: &std::path::Path, session_id: &str, diagnosis: &str) {
    cli()
        .arg("submit")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--session")
        .arg(session_id)
        .arg("--diagnosis")
        .arg(diagnosis)
        .arg("--medications")
        .arg("amoxicilline")
        .arg("--justification")
        .arg("Tableau clinique typique.")
        .assert()
        .success()
        .stdout(predicate::str::contains("Session completed"));
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Adaptive clinical case tutoring system",
        ));
}

#[test]
fn test_cold_start_issues_test_session() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--learner")
        .arg("etu_42")
        .arg("--category")
        .arg("Infectiologie")
        .arg("--seed")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("TEST SESSION"));

    // The new session landed in the journal.
    let journal = fs::read_to_string(data_dir.join("sessions.jsonl")).unwrap();
    assert!(journal.contains("etu_42"));
    assert!(journal.contains("in_progress"));
}

#[test]
fn test_start_then_submit_completes_session() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let session_id = start_session(&data_dir, "etu_42", "Infectiologie");
    submit_session(&data_dir, &session_id, "pyelonephrite");

    let journal = fs::read_to_string(data_dir.join("sessions.jsonl")).unwrap();
    assert!(journal.contains("completed"));
    assert!(journal.contains(&session_id));
}

#[test]
fn test_history_lists_completed_sessions() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    // Empty history first.
    cli()
        .arg("history")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--learner")
        .arg("etu_42")
        .arg("--category")
        .arg("Infectiologie")
        .assert()
        .success()
        .stdout(predicate::str::contains("No completed sessions"));

    let session_id = start_session(&data_dir, "etu_42", "Infectiologie");
    submit_session(&data_dir, &session_id, "pyelonephrite");

    cli()
        .arg("history")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--learner")
        .arg("etu_42")
        .arg("--category")
        .arg("Infectiologie")
        .assert()
        .success()
        .stdout(predicate::str::contains("test"))
        .stdout(predicate::str::contains("Current level:"))
        .stdout(predicate::str::contains("Next session: formative"));
}

#[test]
fn test_stale_session_cleaned_up_on_next_start() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    // Start a session and walk away without submitting.
    start_session(&data_dir, "etu_42", "Infectiologie");

    // The next start force-completes it and moves on to a formative.
    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--learner")
        .arg("etu_42")
        .arg("--category")
        .arg("Infectiologie")
        .assert()
        .success()
        .stdout(predicate::str::contains("FORMATIVE SESSION"));

    // The abandoned session shows up in history at the stale score.
    cli()
        .arg("history")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--learner")
        .arg("etu_42")
        .arg("--category")
        .arg("Infectiologie")
        .assert()
        .success()
        .stdout(predicate::str::contains("15.0"));
}

#[test]
fn test_rollup_creates_csv() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let session_id = start_session(&data_dir, "etu_42", "Infectiologie");
    submit_session(&data_dir, &session_id, "pyelonephrite");

    cli()
        .arg("rollup")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled up 1 sessions"));

    let csv_path = data_dir.join("sessions.csv");
    assert!(csv_path.exists());

    let csv_content = fs::read_to_string(&csv_path).unwrap();
    assert!(csv_content.contains("id,learner_id"));
    assert!(csv_content.contains(&session_id));
}

#[test]
fn test_rollup_with_cleanup() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let session_id = start_session(&data_dir, "etu_42", "Infectiologie");
    submit_session(&data_dir, &session_id, "pyelonephrite");

    cli()
        .arg("rollup")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--cleanup")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleaned up 1 processed journal"));

    let entries: Vec<_> = fs::read_dir(&data_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".processed"))
        .collect();
    assert_eq!(entries.len(), 0);
}

#[test]
fn test_empty_rollup() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    cli()
        .arg("rollup")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to roll up"));
}

#[test]
fn test_unknown_category_fails() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--learner")
        .arg("etu_42")
        .arg("--category")
        .arg("Gériatrie")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No cases available"));
}

#[test]
fn test_single_case_category_recycles() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    // Dermatologie has exactly one built-in case.
    let session_id = start_session(&data_dir, "etu_42", "Dermatologie");
    submit_session(&data_dir, &session_id, "psoriasis");

    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--learner")
        .arg("etu_42")
        .arg("--category")
        .arg("Dermatologie")
        .assert()
        .success()
        .stdout(predicate::str::contains("derm_psoriasis_01"));
}

#[test]
fn test_seed_makes_selection_reproducible() {
    let dir_a = setup_test_dir();
    let dir_b = setup_test_dir();

    let case_line = |data_dir: &std::path::Path| -> String {
        let output = cli()
            .arg("start")
            .arg("--data-dir")
            .arg(data_dir)
            .arg("--learner")
            .arg("etu_42")
            .arg("--category")
            .arg("Infectiologie")
            .arg("--seed")
            .arg("7")
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        String::from_utf8_lossy(&output)
            .lines()
            .find(|l| l.trim().starts_with("Case: "))
            .expect("no case line")
            .trim()
            .to_string()
    };

    assert_eq!(case_line(dir_a.path()), case_line(dir_b.path()));
}

#[test]
fn test_kb_command_summarizes_and_exports() {
    let temp_dir = setup_test_dir();
    let export_path = temp_dir.path().join("kb.json");

    cli()
        .arg("kb")
        .arg("--export")
        .arg(&export_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Knowledge base:"))
        .stdout(predicate::str::contains("Infectiologie"));

    assert!(export_path.exists());
    let exported = fs::read_to_string(&export_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&exported).unwrap();
    assert!(parsed.get("cases").is_some());
}
