//! Broker run specs

use crate::prelude::*;
use std::io::{BufRead, BufReader};
use std::process::Stdio;

#[test]
fn run_reports_ready_and_locks_data_directory() {
    let broker = Broker::empty();
    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("keeld"))
        .arg("--config")
        .arg(broker.config_path())
        .arg("run")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut line = String::new();
    let stdout = child.stdout.take().unwrap();
    BufReader::new(stdout).read_line(&mut line).unwrap();
    let lock = broker.data_dir().join("broker.lock");
    let locked = lock.exists();

    // A second broker on the same data directory must not start
    broker
        .keeld()
        .args(&["run"])
        .fails()
        .stderr_has("already running");

    child.kill().unwrap();
    child.wait().unwrap();

    assert_eq!(line.trim(), "READY");
    assert!(locked);
    let log = std::fs::read_to_string(broker.log_path()).unwrap();
    assert!(log.contains("--- keeld: starting (pid: "));
    assert!(log.contains("Failed to start broker"));
}
