//! Restore specs
//!
//! Verify that restore only ever writes into an empty data directory.

use crate::prelude::*;

#[test]
fn restore_refuses_non_empty_data_directory() {
    let broker = Broker::empty();
    std::fs::create_dir_all(broker.data_dir()).unwrap();
    std::fs::write(broker.data_dir().join("keep.txt"), "precious").unwrap();

    broker
        .keeld()
        .args(&["restore", "--checkpoint-id", "7"])
        .fails()
        .stderr_has("is not empty");

    assert_eq!(entries(&broker.data_dir()), vec!["keep.txt"]);
    let kept = std::fs::read_to_string(broker.data_dir().join("keep.txt")).unwrap();
    assert_eq!(kept, "precious");
}

#[test]
fn restore_without_backups_fails_and_leaves_directory_empty() {
    let broker = Broker::empty();

    broker
        .keeld()
        .args(&["restore", "--checkpoint-id", "7", "--brokers", "1"])
        .fails()
        .stderr_has("no completed backup")
        .stderr_has("checkpoint 7");

    assert!(entries(&broker.data_dir()).is_empty());
}

#[test]
fn restore_logs_to_stderr_not_the_data_directory() {
    let broker = Broker::empty();

    broker
        .keeld()
        .args(&["restore", "--checkpoint-id", "3"])
        .fails()
        .stderr_has("starting restore");

    assert!(!broker.log_path().exists());
}
