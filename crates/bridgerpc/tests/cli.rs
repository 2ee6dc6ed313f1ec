#![cfg(all(unix, feature = "cli"))]

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn bridgerpc() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_bridgerpc"));
    command.arg("--log-level").arg("error");
    command
}

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/bridgerpc-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// Opens (and immediately drops) one connection once the server accepts.
fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    loop {
        if UnixStream::connect(path).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("socket never became connectable");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn version_prints_package_version() {
    let output = bridgerpc().arg("version").output().expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("bridgerpc {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn selftest_reports_json() {
    let output = bridgerpc()
        .args(["--format", "json", "selftest", "--count", "5", "--chunk-size", "4"])
        .output()
        .expect("selftest should run");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("selftest output should be json");
    assert_eq!(report["requests"], 5);
    assert_eq!(report["passed"], 5);
    assert_eq!(report["probe"], true);
}

#[test]
fn call_and_probe_against_serve() {
    let dir = unique_temp_dir("serve");
    let sock_path = dir.join("echo.sock");

    // One connection for the readiness check, one call, one probe.
    let mut server = bridgerpc()
        .arg("serve")
        .arg(&sock_path)
        .args(["--max-connections", "3"])
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serve should start");

    wait_for_socket(&sock_path, Duration::from_secs(3));

    let output = bridgerpc()
        .args(["--format", "json", "call"])
        .arg(&sock_path)
        .args(["--path", "/echo", "--json", "{\"test\":\"data\"}"])
        .output()
        .expect("call should run");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let call: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("call output should be json");
    assert_eq!(call["status"], "SUCCESS");
    assert_eq!(call["body"]["test"], "data");

    let output = bridgerpc()
        .args(["--format", "json", "probe"])
        .arg(&sock_path)
        .args(["--timeout", "2s"])
        .output()
        .expect("probe should run");
    assert!(output.status.success());
    let probe: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("probe output should be json");
    assert_eq!(probe["alive"], true);

    let deadline = Instant::now() + Duration::from_secs(5);
    let status = loop {
        if let Some(status) = server.try_wait().expect("serve status should be readable") {
            break Some(status);
        }
        if Instant::now() >= deadline {
            break None;
        }
        thread::sleep(Duration::from_millis(25));
    };
    if status.is_none() {
        let _ = server.kill();
        let _ = server.wait();
    }
    let _ = std::fs::remove_dir_all(&dir);
    assert!(status.is_some_and(|s| s.success()), "serve should exit after max connections");
}

#[test]
fn unknown_path_exits_with_failure() {
    let dir = unique_temp_dir("nohandler");
    let sock_path = dir.join("echo.sock");

    let mut server = bridgerpc()
        .arg("serve")
        .arg(&sock_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");
    wait_for_socket(&sock_path, Duration::from_secs(3));

    let output = bridgerpc()
        .args(["--format", "json", "call"])
        .arg(&sock_path)
        .args(["--path", "/missing", "--data", "x"])
        .output()
        .expect("call should run");

    let _ = server.kill();
    let _ = server.wait();
    let _ = std::fs::remove_dir_all(&dir);

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("NO_HANDLER_FOR_PATH"), "{stdout}");
}

#[test]
fn probe_missing_socket_is_transport_error() {
    let output = bridgerpc()
        .arg("probe")
        .arg(format!("/tmp/bridgerpc-missing-{}.sock", std::process::id()))
        .output()
        .expect("probe should run");

    assert_eq!(output.status.code(), Some(3));
}
