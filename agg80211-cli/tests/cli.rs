use std::io::Write;
use std::process::Command;

use agg80211_mac::{build_action, ActionBody, Delba};
use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::NamedTempFile;

#[test]
fn check_config_prints_effective_settings() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[block_ack]\nmin_block = 4\nmax_block = 32\nallow_list = [\"02:00:00:00:00:07\"]"
    )
    .unwrap();


    Command::cargo_bin("agg80211-cli")
        .unwrap()
        .arg("check-config")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"))
        .stdout(predicate::str::contains("block_ack.max_block"))
        .stdout(predicate::str::contains("02:00:00:00:00:07"));
}

#[test]
fn check_config_rejects_inverted_block_bounds() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[block_ack]\nmin_block = 10\nmax_block = 5").unwrap();

    Command::cargo_bin("agg80211-cli")
        .unwrap()
        .arg("check-config")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_block"));
}

#[test]
fn decode_delba() {
    let bytes = build_action(&ActionBody::Delba(Delba { initiator: true, tid: 6, reason: 39 }));
    Command::cargo_bin("agg80211-cli")
        .unwrap()
        .args(["decode", "action", &hex::encode(bytes)])
        .assert()
        .success()
        .stdout(predicate::str::contains("DELBA"))
        .stdout(predicate::str::contains("39"));
}

#[test]
fn decode_rejects_bad_hex() {
    Command::cargo_bin("agg80211-cli")
        .unwrap()
        .args(["decode", "amsdu", "zz"])
        .assert()
        .failure();
}

#[test]
fn simulate_reports_full_delivery_as_json() {
    let output = Command::cargo_bin("agg80211-cli")
        .unwrap()
        .args(["simulate", "--frames", "60", "--reverse", "5", "--len", "120", "--format", "json"])
        .output()
        .expect("failed to run simulate");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json: Value = serde_json::from_slice(&output.stdout).expect("invalid JSON output");
    assert_eq!(json["b"]["delivered"], 60);
    assert_eq!(json["a"]["delivered"], 5);
    assert!(json["actions"].as_u64().unwrap() >= 1);
}
