//! Command line specs

use crate::prelude::*;

#[test]
fn help_lists_subcommands() {
    keeld()
        .arg("--help")
        .assert()
        .success()
        .stdout_has("run")
        .stdout_has("restore");
}

#[test]
fn restore_requires_checkpoint_id() {
    let broker = Broker::empty();

    broker
        .keeld()
        .args(&["restore"])
        .fails()
        .stderr_has("--checkpoint-id");
}

#[test]
fn unknown_config_keys_are_rejected() {
    let broker = Broker::empty();
    broker.write_config("node_id = 1\nshards = 4\n");

    broker
        .keeld()
        .args(&["restore", "--checkpoint-id", "1"])
        .fails()
        .stderr_has("failed to parse config");
}

#[test]
fn invalid_config_is_rejected() {
    let broker = Broker::empty();
    broker.write_config("partitions = []\n");

    broker
        .keeld()
        .args(&["run"])
        .fails()
        .stderr_has("no partitions configured");
}

#[test]
fn missing_config_file_is_reported() {
    keeld()
        .args(["--config", "/nonexistent/keel.toml", "run"])
        .assert()
        .failure()
        .stderr_has("failed to read config");
}
