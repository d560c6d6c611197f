// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use keel_core::config::{ClusterConfig, MemberConfig, RaftConfig};
use keel_core::{Intent, NodeId, RecordType, ValueType};
use serde_json::json;
use tempfile::TempDir;

const PARTITION: PartitionId = PartitionId(1);
const WAIT: Duration = Duration::from_secs(10);

fn config(dir: &Path, address: &str) -> BrokerConfig {
    BrokerConfig {
        node_id: NodeId(1),
        data_dir: dir.join("data"),
        log_path: dir.join("keeld.log"),
        partitions: vec![PARTITION],
        cluster: ClusterConfig {
            members: vec![MemberConfig {
                id: NodeId(1),
                address: address.to_string(),
            }],
            ..ClusterConfig::default()
        },
        raft: RaftConfig {
            heartbeat_interval: Duration::from_millis(20),
            election_timeout: Duration::from_millis(100),
        },
        ..BrokerConfig::default()
    }
}

async fn wait_for_leader(broker: &Broker) {
    let partition = broker.partition(PARTITION).unwrap();
    let deadline = tokio::time::Instant::now() + WAIT;
    while !partition.raft().is_leader() {
        assert!(tokio::time::Instant::now() < deadline, "no leader elected");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn startup_takes_the_data_directory_lock() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), "127.0.0.1:0");

    let mut broker = startup(&config).await.unwrap();
    let lock = std::fs::read_to_string(config.data_dir.join(LOCK_FILE)).unwrap();
    assert_eq!(lock.trim(), std::process::id().to_string());

    let second = startup(&config).await;
    assert!(matches!(second, Err(LifecycleError::LockFailed(_))));

    broker.shutdown().await.unwrap();
    assert!(!config.data_dir.join(LOCK_FILE).exists());
}

#[tokio::test]
async fn startup_opens_every_configured_partition() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), "127.0.0.1:0");
    config.partitions = vec![PartitionId(1), PartitionId(2)];

    let mut broker = startup(&config).await.unwrap();

    assert_eq!(broker.tasks.len(), 2);
    assert!(broker.partition(PartitionId(2)).is_some());
    assert!(config.partition_dir(PartitionId(2)).is_dir());
    assert_ne!(broker.local_addr().unwrap().port(), 0);
    broker.shutdown().await.unwrap();
    assert!(broker.tasks.is_empty());
}

#[tokio::test]
async fn failed_bind_releases_the_lock() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), "not an address");

    let result = startup(&config).await;

    assert!(matches!(result, Err(LifecycleError::BindFailed(..))));
    assert!(!config.data_dir.join(LOCK_FILE).exists());
}

#[tokio::test]
async fn submitted_commands_are_answered_by_the_leader() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), "127.0.0.1:0");
    let mut broker = startup(&config).await.unwrap();
    wait_for_leader(&broker).await;

    let command = Record::command(ValueType::Job, Intent::Create, json!({ "job_type": "payment" }));
    let response = broker.submit(PARTITION, command).unwrap();
    let response = tokio::time::timeout(WAIT, response).await.unwrap().unwrap();

    assert_eq!(response.request_id, 1);
    assert_eq!(response.key, 1);
    assert_eq!(response.record_type, RecordType::Event);
    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn submit_rejects_unknown_partitions() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), "127.0.0.1:0");
    let mut broker = startup(&config).await.unwrap();

    let command = Record::command(ValueType::Job, Intent::Create, json!({ "job_type": "payment" }));
    let result = broker.submit(PartitionId(9), command);

    assert!(matches!(result, Err(LifecycleError::UnknownPartition(PartitionId(9)))));
    broker.shutdown().await.unwrap();
}

#[tokio::test]
async fn submit_forwards_partition_refusals() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path(), "127.0.0.1:0");
    let mut broker = startup(&config).await.unwrap();
    wait_for_leader(&broker).await;

    let event = Record::event(1, ValueType::Job, Intent::Created, json!({ "job_type": "payment" }));
    let result = broker.submit(PARTITION, event);

    assert!(matches!(
        result,
        Err(LifecycleError::Partition(PARTITION, PartitionError::NotACommand(RecordType::Event)))
    ));
    broker.shutdown().await.unwrap();
}
