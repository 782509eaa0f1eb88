//! Integration tests for `start`, `status`, `logs`, `doctor` and `stop`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn matrix(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("matrix"));
    cmd.env("NO_COLOR", "1")
        .env("MATRIX_HOME", home)
        .env_remove("RUST_LOG")
        .env_remove("MATRIX_SDK_DEBUG");
    cmd
}

fn json_stdout(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is one JSON document")
}

#[test]
fn test_status_with_nothing_running() {
    let home = tempfile::tempdir().expect("tempdir");
    matrix(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No runners are running."));

    let output = matrix(home.path()).args(["status", "--json"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(json_stdout(&output), Value::Array(Vec::new()));
}

#[test]
fn test_start_rejects_port_zero() {
    let home = tempfile::tempdir().expect("tempdir");
    matrix(home.path())
        .args(["start", home.path().to_str().unwrap(), "--port", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--port"));
    assert!(!home.path().join("state").exists());
}

#[test]
fn test_stop_unknown_alias_is_not_an_error() {
    let home = tempfile::tempdir().expect("tempdir");
    matrix(home.path())
        .args(["stop", "ghost"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ghost is not running"));

    let output = matrix(home.path())
        .args(["stop", "ghost", "--json"])
        .output()
        .unwrap();
    let doc = json_stdout(&output);
    assert_eq!(doc["alias"], "ghost");
    assert_eq!(doc["stopped"], false);
}

#[test]
fn test_doctor_without_lock_reports_failure() {
    let home = tempfile::tempdir().expect("tempdir");
    matrix(home.path())
        .args(["doctor", "ghost"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Server not running"));

    let output = matrix(home.path())
        .args(["doctor", "ghost", "--json"])
        .output()
        .unwrap();
    let doc = json_stdout(&output);
    assert_eq!(doc["status"], "fail");
}

#[test]
fn test_invalid_alias_is_a_runtime_error_in_json() {
    let home = tempfile::tempdir().expect("tempdir");
    let output = matrix(home.path())
        .args(["stop", "../etc", "--json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let doc = json_stdout(&output);
    assert_eq!(doc["error"], true);
    assert_eq!(doc["code"], "runtime");
    assert!(doc["message"].as_str().unwrap().contains("../etc"));
}

#[test]
fn test_start_without_runner_json_is_a_schema_error() {
    let home = tempfile::tempdir().expect("tempdir");
    let target = home.path().join("empty");
    std::fs::create_dir_all(&target).unwrap();

    let output = matrix(home.path())
        .arg("start")
        .arg(&target)
        .arg("--json")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(json_stdout(&output)["code"], "schema");
}

#[test]
fn test_logs_of_unknown_alias_prints_nothing() {
    let home = tempfile::tempdir().expect("tempdir");
    matrix(home.path())
        .args(["logs", "ghost"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_logs_prints_trailing_lines() {
    let home = tempfile::tempdir().expect("tempdir");
    let logs = home.path().join("logs");
    std::fs::create_dir_all(&logs).unwrap();
    std::fs::write(logs.join("svc.log"), "one\ntwo\nthree\n").unwrap();

    matrix(home.path())
        .args(["logs", "svc", "-n", "2"])
        .assert()
        .success()
        .stdout("two\nthree\n");
}

/// Full lifecycle with a shell script standing in for `node`.
#[cfg(unix)]
#[test]
#[serial_test::serial]
fn test_start_status_logs_stop_lifecycle() {
    let home = tempfile::tempdir().expect("tempdir");
    let target = home.path().join("echoer");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(
        target.join("runner.json"),
        r#"{"type": "node", "entry": "server.js", "env": {"WHO": "echoer"}}"#,
    )
    .unwrap();
    std::fs::write(target.join("server.js"), "echo \"$WHO listening on $PORT\"\nexec sleep 30\n").unwrap();

    let output = matrix(home.path())
        .env("NODE", "sh")
        .arg("start")
        .arg(&target)
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    let info = json_stdout(&output);
    assert_eq!(info["alias"], "echoer");
    let port = info["port"].as_u64().expect("port recorded");

    matrix(home.path())
        .arg("start")
        .arg(&target)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Lock file already exists"));

    let status = json_stdout(&matrix(home.path()).args(["status", "--json"]).output().unwrap());
    assert_eq!(status.as_array().map(Vec::len), Some(1));
    assert_eq!(status[0]["pid"], info["pid"]);

    let expected = format!("echoer listening on {port}");
    let mut seen = false;
    for _ in 0..50 {
        let out = matrix(home.path()).args(["logs", "echoer"]).output().unwrap();
        if String::from_utf8_lossy(&out.stdout).contains(&expected) {
            seen = true;
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    assert!(seen, "log line never appeared");

    matrix(home.path())
        .args(["stop", "echoer"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stopped echoer"));

    matrix(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No runners are running."));
}
