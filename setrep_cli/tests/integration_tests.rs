//! Integration tests for the setrep binary.
//!
//! These tests verify end-to-end behavior including:
//! - Session logging workflow
//! - Plateau analysis across sessions
//! - History export and plan validation
//! - Interactive input handling

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to create a test data directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the path to the CLI binary
fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("setrep"))
}

fn auto_complete(data_dir: &Path) {
    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--auto-complete")
        .assert()
        .success()
        .stdout(predicate::str::contains("Workout complete"));
}

fn count_events(data_dir: &Path, event: &str) -> usize {
    let wal = fs::read_to_string(data_dir.join("sessions.wal")).expect("Failed to read WAL");
    let needle = format!("\"event\":\"{}\"", event);
    wal.lines().filter(|l| l.contains(&needle)).count()
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Strength workout session tracker"));
}

#[test]
fn test_auto_complete_logs_session() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--auto-complete")
        .arg("--note")
        .arg("felt strong")
        .assert()
        .success()
        .stdout(predicate::str::contains("Workout complete"))
        .stdout(predicate::str::contains("Series: 15"));

    assert!(data_dir.join("sessions.wal").exists());
    assert_eq!(count_events(&data_dir, "started"), 1);
    assert_eq!(count_events(&data_dir, "series"), 15);
    assert_eq!(count_events(&data_dir, "completed"), 1);

    let wal = fs::read_to_string(data_dir.join("sessions.wal")).unwrap();
    assert!(wal.contains("felt strong"));
}

#[test]
fn test_verbose_logs_to_stderr_only() {
    let temp_dir = setup_test_dir();

    cli()
        .env_remove("RUST_LOG")
        .arg("start")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--auto-complete")
        .arg("--verbose")
        .assert()
        .success()
        .stderr(predicate::str::contains("Plateau scan"))
        .stdout(predicate::str::contains("Plateau scan").not());
}

#[test]
fn test_unknown_plan_fails() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("--plan")
        .arg("missing")
        .arg("--auto-complete")
        .assert()
        .failure();
}

#[test]
fn test_no_plateaus_without_history() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("plateaus")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No plateaus detected"));
}

#[test]
fn test_repeated_sessions_report_plateau() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    for _ in 0..3 {
        auto_complete(&data_dir);
    }

    cli()
        .arg("plateaus")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Back Squat: mild plateau over 3 sessions",
        ))
        .stdout(predicate::str::contains("Increase load to 82.5kg"));

    // Next session flags the plateau up front
    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--auto-complete")
        .assert()
        .success()
        .stdout(predicate::str::contains("⚠ Back Squat"));
}

#[test]
fn test_plateaus_are_per_user() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    for _ in 0..2 {
        auto_complete(&data_dir);
    }

    cli()
        .arg("plateaus")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--user")
        .arg("someone-else")
        .assert()
        .success()
        .stdout(predicate::str::contains("No plateaus detected"));
}

#[test]
fn test_history_csv_export() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();
    let csv_path = data_dir.join("export/history.csv");

    auto_complete(&data_dir);

    cli()
        .arg("history")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--csv")
        .arg(&csv_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 15 series"));

    let csv = fs::read_to_string(&csv_path).expect("Failed to read CSV");
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().contains("exercise_id"));
    assert_eq!(lines.count(), 15);
    assert!(csv.contains("back_squat"));
}

#[test]
fn test_history_export_appends_without_repeating_headers() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();
    let csv_path = data_dir.join("history.csv");

    auto_complete(&data_dir);
    for _ in 0..2 {
        cli()
            .arg("history")
            .arg("--data-dir")
            .arg(&data_dir)
            .arg("--csv")
            .arg(&csv_path)
            .assert()
            .success();
    }

    let csv = fs::read_to_string(&csv_path).unwrap();
    let headers = csv.lines().filter(|l| l.starts_with("exercise_id")).count();
    assert_eq!(headers, 1);
    assert_eq!(csv.lines().count(), 31);
}

#[test]
fn test_demo_plan_validates() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("plan")
        .arg("validate")
        .arg("--data-dir")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Plan demo is valid: 6 exercises in 3 groups",
        ));
}

#[test]
fn test_invalid_plan_file_rejected() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();
    fs::create_dir_all(data_dir.join("plans")).unwrap();

    let plan = serde_json::json!([
        {
            "id": "dips",
            "name": "Dips",
            "target_sets": 3,
            "target_reps": 10,
            "target_weight": 0.0,
            "recovery_seconds": 60,
            "set_type": "superset",
            "linked_to_previous": true,
            "order_index": 1
        },
        {
            "id": "curls",
            "name": "Curls",
            "target_sets": 0,
            "target_reps": 12,
            "target_weight": 12.5,
            "recovery_seconds": 60,
            "order_index": 2
        }
    ]);
    fs::write(data_dir.join("plans/arms.json"), plan.to_string()).unwrap();

    cli()
        .arg("plan")
        .arg("validate")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--plan")
        .arg("arms")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no previous exercise"))
        .stderr(predicate::str::contains("no target sets"));

    // Sessions refuse to start on an invalid plan
    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--plan")
        .arg("arms")
        .arg("--auto-complete")
        .assert()
        .failure();
    assert!(!data_dir.join("sessions.wal").exists());
}

#[test]
fn test_interactive_cancel_deletes_session() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(&data_dir)
        .write_stdin("\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Back Squat set 1: 80kg x 5"))
        .stdout(predicate::str::contains("Workout cancelled"));

    assert_eq!(count_events(&data_dir, "series"), 1);
    assert_eq!(count_events(&data_dir, "deleted"), 1);
}

#[test]
fn test_interactive_custom_values_and_bad_input() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(&data_dir)
        .write_stdin("85 4\nbogus\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Back Squat set 1: 85kg x 4"))
        .stdout(predicate::str::contains("unknown command: bogus"))
        .stdout(predicate::str::contains("Workout cancelled"));
}

#[test]
fn test_closed_input_leaves_session_resumable() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let output = cli()
        .arg("start")
        .arg("--data-dir")
        .arg(&data_dir)
        .write_stdin("\n")
        .output()
        .expect("Failed to run setrep");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let session_id = stdout
        .split("--resume ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .expect("No resume hint printed")
        .to_string();

    cli()
        .arg("start")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--resume")
        .arg(&session_id)
        .arg("--auto-complete")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Session: {}", session_id)))
        .stdout(predicate::str::contains("Series: 15"));

    assert_eq!(count_events(&data_dir, "started"), 1);
    assert_eq!(count_events(&data_dir, "series"), 15);
}
