use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("fixtures")
        .join(path)
}

fn snapdiff(workdir: &Path) -> Command {
    let config = workdir.join("config.toml");
    if !config.exists() {
        fs::write(&config, "").expect("write config");
    }
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ltm-snapdiff"));
    cmd.arg("--config")
        .arg(config)
        .arg("--db")
        .arg(workdir.join("snapshots.db"));
    cmd
}

fn create_backup(workdir: &Path, version: &str, comment: &str) -> String {
    let output = snapdiff(workdir)
        .args(["backup", "create", "--device"])
        .arg(format!("edge-a={}", fixture(&format!("{version}/edge-a.conf")).display()))
        .args(["--author", "alice", "--comment", comment, "--format", "json"])
        .output()
        .expect("run backup create");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let snapshot: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("snapshot json");
    snapshot["id"].as_str().expect("id").to_string()
}

#[test]
fn backup_create_then_list_newest_first() {
    let dir = tempdir().expect("tempdir");
    let first = create_backup(dir.path(), "v1", "before change");
    let second = create_backup(dir.path(), "v2", "after change");

    let output = snapdiff(dir.path())
        .args(["backup", "list"])
        .output()
        .expect("run backup list");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with(&second));
    assert!(lines[1].starts_with(&first));
    assert!(lines[0].contains("author=alice"));
    assert!(lines[0].contains("devices=edge-a"));
}

#[test]
fn backup_show_lists_category_counts() {
    let dir = tempdir().expect("tempdir");
    let id = create_backup(dir.path(), "v1", "baseline");

    snapdiff(dir.path())
        .args(["backup", "show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("id: {id}")))
        .stdout(predicate::str::contains("- edge-a: "))
        .stdout(predicate::str::contains("pools=1"))
        .stdout(predicate::str::contains("comment: baseline"));
}

#[test]
fn backup_list_filters_by_device() {
    let dir = tempdir().expect("tempdir");
    create_backup(dir.path(), "v1", "baseline");

    snapdiff(dir.path())
        .args(["backup", "list", "--device", "edge-z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no backups"));
}

#[test]
fn backup_delete_removes_snapshot() {
    let dir = tempdir().expect("tempdir");
    let id = create_backup(dir.path(), "v1", "baseline");

    snapdiff(dir.path())
        .args(["backup", "delete", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("deleted {id}")));
    snapdiff(dir.path())
        .args(["backup", "show", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("snapshot not found"));
}

#[test]
fn backup_of_malformed_config_fails_and_stores_nothing() {
    let dir = tempdir().expect("tempdir");
    let broken = dir.path().join("broken.conf");
    fs::write(&broken, "ltm pool /Common/p {\n    monitor /Common/http\n").expect("write");

    snapdiff(dir.path())
        .args(["backup", "create", "--device"])
        .arg(format!("edge-a={}", broken.display()))
        .assert()
        .failure()
        .stderr(predicate::str::contains("edge-a"));
    snapdiff(dir.path())
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no backups"));
}

#[test]
fn live_backup_reads_the_live_directory() {
    let dir = tempdir().expect("tempdir");

    snapdiff(dir.path())
        .args(["backup", "create", "--fetch", "--fetch-device", "edge-a", "--live-dir"])
        .arg(fixture("v2"))
        .assert()
        .success()
        .stdout(predicate::str::contains("status: success"));
}

#[test]
fn expired_needs_a_retention_period() {
    let dir = tempdir().expect("tempdir");
    create_backup(dir.path(), "v1", "baseline");

    snapdiff(dir.path())
        .args(["backup", "expired"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no retention period"));
    snapdiff(dir.path())
        .args(["backup", "expired", "--days", "1"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
