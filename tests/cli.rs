//! Integration tests for the medview CLI.
//!
//! These tests run the actual binary against temporary data directories
//! to verify end-to-end behavior.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to get medview command, logging into `logs`
fn medview(logs: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("medview").unwrap();
    cmd.env("MEDVIEW_LOG_DIR", logs.path()).env_remove("MEDVIEW_LOG");
    cmd
}

/// Creates a data directory with a DICOM series, a volume and its thumbnail
fn setup_data() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::create_dir(dir.path().join("a")).unwrap();
    fs::write(dir.path().join("a/s2.dcm"), "slice two").unwrap();
    fs::write(dir.path().join("a/s1.dcm"), "slice one").unwrap();
    fs::write(dir.path().join("a/vol.nii"), "volume").unwrap();
    fs::write(dir.path().join("a/vol-SERIES.jpg"), "jpeg").unwrap();
    fs::write(dir.path().join("a/notes.txt"), "ignored").unwrap();

    // Hidden directories are never scanned
    fs::create_dir(dir.path().join(".cache")).unwrap();
    fs::write(dir.path().join(".cache/old.nii"), "stale").unwrap();

    dir
}

#[test]
fn classify_groups_series_and_pairs_thumbnail() {
    let data = setup_data();
    let logs = TempDir::new().unwrap();

    medview(&logs)
        .arg("classify")
        .arg(data.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("dicomSeries"))
        .stdout(predicate::str::contains("a/s1.dcm [2 files]"))
        .stdout(predicate::str::contains("thumbnail vol-SERIES.jpg"))
        .stdout(predicate::str::contains("2 records from 4 files"));
}

#[test]
fn classify_json_output() {
    let data = setup_data();
    let logs = TempDir::new().unwrap();

    let output = medview(&logs)
        .arg("classify")
        .arg(data.path())
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["id"], 0);
    assert_eq!(records[0]["imageKind"], "dicomSeries");
    assert_eq!(records[0]["baseUrl"], "a/");
    assert_eq!(records[1]["imageKind"], "volume");
}

#[test]
fn classify_fails_on_nonexistent_path() {
    let logs = TempDir::new().unwrap();

    medview(&logs)
        .arg("classify")
        .arg("/nonexistent/path/that/does/not/exist")
        .assert()
        .failure();
}

#[test]
fn reconcile_applies_remote_scene() {
    let data = setup_data();
    let logs = TempDir::new().unwrap();
    let scenes = TempDir::new().unwrap();
    let remote = scenes.path().join("remote.json");
    fs::write(
        &remote,
        r#"{"toolBar":{"renderersLinked":false},
            "renderers":[{"general":{"id":1,"type":"2D"},"renderer":{"orientation":"X"},"selected":true},
                         {"general":{"id":42}}]}"#,
    )
    .unwrap();

    medview(&logs)
        .arg("reconcile")
        .arg(data.path())
        .arg("--scene")
        .arg(&remote)
        .assert()
        .success()
        .stdout(predicate::str::contains("Reconciled: +1 -0 panes"))
        .stdout(predicate::str::contains("Skipped unknown records: 42"))
        .stdout(predicate::str::contains("Loaded: 1 panes"))
        .stdout(predicate::str::contains("\"orientation\": \"X\""));
}

#[test]
fn reconcile_removes_panes_missing_remotely() {
    let data = setup_data();
    let logs = TempDir::new().unwrap();
    let scenes = TempDir::new().unwrap();
    let local = scenes.path().join("local.json");
    let remote = scenes.path().join("remote.json");
    fs::write(&local, r#"{"renderers":[{"general":{"id":0}},{"general":{"id":1}}]}"#).unwrap();
    fs::write(&remote, r#"{"renderers":[{"general":{"id":1}}]}"#).unwrap();

    medview(&logs)
        .arg("reconcile")
        .arg(data.path())
        .arg("--local")
        .arg(&local)
        .arg("--scene")
        .arg(&remote)
        .assert()
        .success()
        .stdout(predicate::str::contains("Reconciled: +0 -1 panes"));
}

#[test]
fn reconcile_honours_config_capacity() {
    let data = setup_data();
    let logs = TempDir::new().unwrap();
    let scenes = TempDir::new().unwrap();
    let config = scenes.path().join("config.json");
    let remote = scenes.path().join("remote.json");
    fs::write(&config, r#"{"max_renderers": 1}"#).unwrap();
    fs::write(&remote, r#"{"renderers":[{"general":{"id":0}},{"general":{"id":1}}]}"#).unwrap();

    medview(&logs)
        .arg("--config")
        .arg(&config)
        .arg("reconcile")
        .arg(data.path())
        .arg("--scene")
        .arg(&remote)
        .assert()
        .success()
        .stdout(predicate::str::contains("Reconciled: +1 -0 panes, 0 updated, 1 skipped"));
}

#[test]
fn reconcile_fails_on_missing_scene() {
    let data = setup_data();
    let logs = TempDir::new().unwrap();

    medview(&logs)
        .arg("reconcile")
        .arg(data.path())
        .arg("--scene")
        .arg(data.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read scene"));
}

#[test]
fn verbose_reports_duration() {
    let data = setup_data();
    let logs = TempDir::new().unwrap();

    medview(&logs)
        .arg("classify")
        .arg(data.path())
        .arg("--verbose")
        .assert()
        .success()
        .stderr(predicate::str::contains("Completed in"));
}
