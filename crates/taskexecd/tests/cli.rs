//! Drives the daemon binary through import, a single tick and the report.

use std::path::Path;
use std::process::{Command, Output};

use taskexec_core::ReconcileReport;

fn taskexecd(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taskexecd"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn write_json(path: &Path, value: serde_json::Value) {
    std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

#[test]
fn import_tick_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let seed = dir.path().join("seed.json");
    let snapshot = dir.path().join("cluster.json");

    write_json(
        &seed,
        serde_json::json!({
            "templates": {
                "green-alg": { "name": "green-alg", "algorithmImage": "hkube/green-alg", "cpu": 0.5, "mem": "256Mi" }
            },
            "requests": [ { "data": [ { "name": "green-alg" }, { "name": "green-alg" } ] } ]
        }),
    );
    write_json(
        &snapshot,
        serde_json::json!({
            "nodes": [ { "metadata": { "name": "node-1" }, "status": { "allocatable": { "cpu": "8", "memory": "16Gi" } } } ]
        }),
    );
    let data_dir = data_dir.to_str().unwrap();

    let imported = taskexecd(&["import", "--data-dir", data_dir, seed.to_str().unwrap()]);
    assert!(imported.status.success(), "{}", String::from_utf8_lossy(&imported.stderr));

    let once = taskexecd(&["once", "--data-dir", data_dir, "--snapshot", snapshot.to_str().unwrap()]);
    assert!(once.status.success(), "{}", String::from_utf8_lossy(&once.stderr));
    let report: ReconcileReport = serde_json::from_slice(&once.stdout).unwrap();
    assert_eq!(report.algorithms["green-alg"].required, 2);
    assert_eq!(report.algorithms["green-alg"].created, 2);
    assert!(report.unscheduled.is_empty());

    let stored = taskexecd(&["report", "--data-dir", data_dir]);
    assert!(stored.status.success());
    let stored: ReconcileReport = serde_json::from_slice(&stored.stdout).unwrap();
    assert_eq!(stored.timestamp, report.timestamp);
}

#[test]
fn missing_snapshot_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = taskexecd(&[
        "once",
        "--data-dir",
        dir.path().to_str().unwrap(),
        "--snapshot",
        dir.path().join("absent.json").to_str().unwrap(),
    ]);
    assert!(!output.status.success());
}
