// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn write_config(text: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keel.toml");
    std::fs::write(&path, text).unwrap();
    (dir, path)
}

#[test]
fn default_config_is_valid_single_node() {
    let config = BrokerConfig::default();
    config.validate().unwrap();
    assert_eq!(config.member_ids(), vec![NodeId(0)]);
    assert_eq!(config.partitions, vec![PartitionId(1)]);
}

#[test]
fn empty_file_yields_defaults() {
    let (_dir, path) = write_config("");
    let config = BrokerConfig::load(&path).unwrap();
    assert_eq!(config, BrokerConfig::default());
}

#[test]
fn durations_parse_humantime() {
    let (_dir, path) = write_config(
        r#"
node_id = 2
partitions = [1, 2]

[replication]
poll_interval = "250ms"
max_message_length = 100

[[cluster.members]]
id = 1
address = "127.0.0.1:26501"

[[cluster.members]]
id = 2
address = "127.0.0.1:26502"
"#,
    );

    let config = BrokerConfig::load(&path).unwrap();

    assert_eq!(config.replication.poll_interval, Duration::from_millis(250));
    assert_eq!(config.replication.max_message_length, 100);
    assert_eq!(config.replication.leader_retry_backoff, Duration::from_secs(1));
    assert_eq!(config.member_ids(), vec![NodeId(1), NodeId(2)]);
    assert_eq!(
        config.member(NodeId(2)).map(|m| m.address.as_str()),
        Some("127.0.0.1:26502")
    );
}

#[test]
fn unknown_fields_are_rejected() {
    let (_dir, path) = write_config("nodeid = 3\n");
    assert!(matches!(
        BrokerConfig::load(&path),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn missing_file_reports_path() {
    let err = BrokerConfig::load(Path::new("/nonexistent/keel.toml")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/keel.toml"));
}

#[test]
fn node_must_be_a_member() {
    let config = BrokerConfig {
        node_id: NodeId(5),
        cluster: ClusterConfig {
            members: vec![MemberConfig {
                id: NodeId(1),
                address: "127.0.0.1:1".to_string(),
            }],
            ..ClusterConfig::default()
        },
        ..BrokerConfig::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn zero_chunk_length_is_invalid() {
    let mut config = BrokerConfig::default();
    config.replication.max_message_length = 0;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn partition_dir_nests_under_data_dir() {
    let config = BrokerConfig {
        data_dir: PathBuf::from("/var/keel"),
        ..BrokerConfig::default()
    };
    assert_eq!(
        config.partition_dir(PartitionId(3)),
        PathBuf::from("/var/keel/partitions/3")
    );
}
