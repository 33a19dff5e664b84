use assert_cmd::Command;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn write_config(dir: &tempfile::TempDir, toml: &str) -> PathBuf {
    let path = dir.path().join("pool.toml");
    fs::write(&path, toml).unwrap();
    path
}

const VALID: &str = r#"
[runtime]
ask_timeout_ms = 500

[filtration]
duration_secs = 36000
period = 3
reset_hour = 0
tank_percentage = 0.1

[backwash]
period_days = 30
"#;

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["check-config"], 0, "config OK", "stdout")]
#[case(&["topics"], 0, "/settings/filtration/duration", "stdout")]
#[case(&["run", "--mode", "disco"], 3, "/settings/mode", "stderr")]
#[case(&["frobnicate"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, VALID);

    let mut cmd = Command::cargo_bin("poolctl").unwrap();
    cmd.arg("--config").arg(&cfg).args(args).write_stdin("");

    let assert = cmd.assert().code(exit_code);
    if stream == "stdout" {
        assert.stdout(predicate::str::contains(needle));
    } else {
        assert.stderr(predicate::str::contains(needle));
    }
}

#[rstest]
#[case("[filtration]\nperiod = 0\n", "filtration.period")]
#[case("[tank]\neco_low = 80.0\neco_high = 20.0\n", "tank")]
#[case("[backwash]\nperiod_days = 1\n", "backwash.period_days")]
fn check_config_rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, toml);

    Command::cargo_bin("poolctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("check-config")
        .assert()
        .code(2)
        .stderr(predicate::str::contains(needle));
}

#[test]
fn check_config_reports_broken_toml() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[filtration\nperiod = ");

    Command::cargo_bin("poolctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid TOML"));
}

#[test]
fn missing_config_file_fails() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("poolctl")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not be read"));
}

#[test]
fn defaults_are_valid_without_a_config() {
    Command::cargo_bin("poolctl")
        .unwrap()
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("built-in defaults"));
}

#[test]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[filtration]\nperiod = 0\n");

    let out = Command::cargo_bin("poolctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .arg("check-config")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8(out.stderr).unwrap();
    let line = stderr.lines().last().unwrap();
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["reason"], "Config");
}

#[test]
fn topics_mark_apply_once_entries() {
    let out = Command::cargo_bin("poolctl").unwrap().arg("topics").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let line = stdout
        .lines()
        .find(|l| l.starts_with("/status/water/counter"))
        .unwrap();
    assert!(line.ends_with("(once)"));
    assert!(stdout.contains("halt|eco|standby|overflow|comfort|sweep|wash|wintering"));
}

#[test]
fn run_reads_settings_and_answers_state_queries() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, VALID);

    Command::cargo_bin("poolctl")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--mode", "halt"])
        .write_stdin("# comment\n/settings/filtration/period 99\n/settings/light/mode on\nstate\n")
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success()
        .stdout(predicate::str::contains("halt"))
        .stderr(predicate::str::contains("/settings/filtration/period: value"));
}
