use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use tempfile::tempdir;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let config_path = dir.join("config.toml");
    let output = dir.join("panel.png");
    fs::write(
        &config_path,
        format!(
            "[display]\noutput = {:?}\n\n[pipeline]\ndevice_poll_ms = 10\nretry_backoff_ms = 10\n",
            output.display().to_string()
        ),
    )
    .unwrap();
    config_path
}

#[test]
fn test_device_draws_snapshots_and_exits_at_eof() {
    let dir = tempdir().unwrap();
    let config_path = write_config(dir.path());
    let snapshot = json!({
        "lowerleft": { "content": "pi-1: Ready\npi-2: NotReady\n", "font_size": 12 },
        "upperleft": { "content": "2024-01-01 00:00:00\n", "font_size": 12 },
    });

    cargo_bin_cmd!("inky")
        .env("INKY_LOG", "info")
        .arg("--config")
        .arg(&config_path)
        .arg("device")
        .arg("--shutdown-flag")
        .arg(dir.path().join("shutdown"))
        .write_stdin(format!("{snapshot}\nnot a snapshot\n"))
        .assert()
        .success()
        .stderr(predicate::str::contains("dropping undecodable snapshot"));

    let frame = image::open(dir.path().join("panel.png")).unwrap().to_luma8();
    assert_eq!(frame.dimensions(), (212, 104));
    assert!(frame.pixels().any(|pixel| pixel.0[0] == 0));
}

#[test]
fn test_device_stops_when_flag_is_present() {
    let dir = tempdir().unwrap();
    let config_path = write_config(dir.path());
    let flag = dir.path().join("shutdown");
    fs::write(&flag, "").unwrap();

    cargo_bin_cmd!("inky")
        .arg("--config")
        .arg(&config_path)
        .arg("device")
        .arg("--shutdown-flag")
        .arg(&flag)
        .assert()
        .success();

    assert!(dir.path().join("panel.png").exists());
}

#[test]
fn test_nodes_skips_malformed_events() {
    cargo_bin_cmd!("inky")
        .args(["nodes", "--addr", "127.0.0.1:1"])
        .write_stdin("not json\n\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("skipping malformed node event"));
}

#[test]
fn test_client_reports_unreachable_server() {
    cargo_bin_cmd!("inky")
        .args(["client", "--addr", "127.0.0.1:1", "reset"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("connect to inky server"));
}
