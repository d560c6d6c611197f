// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests

use crate::consensus::{ClusterTopology, RaftHandle, RaftPartition};
use keel_core::config::JournalConfig;
use keel_core::{NodeId, PartitionId};
use keel_storage::{checksum, Journal, SnapshotMetadata, SnapshotStore};
use std::path::Path;
use std::time::Duration;

pub const PARTITION: PartitionId = PartitionId(1);

/// Raft handle for `node` in a cluster of `members`, stored in `dir`
pub fn raft_handle(dir: &Path, node: u32, members: &[u32], topology: ClusterTopology) -> RaftHandle {
    let journal = Journal::open(dir, &JournalConfig::default()).unwrap();
    let members: Vec<NodeId> = members.iter().map(|m| NodeId(*m)).collect();
    let raft =
        RaftPartition::new(PARTITION, NodeId(node), &members, journal, dir.to_path_buf()).unwrap();
    RaftHandle::new(raft, topology)
}

/// Single-node raft handle that is already leader
pub fn leader_handle(dir: &Path) -> RaftHandle {
    let handle = raft_handle(dir, 1, &[1], ClusterTopology::new());
    handle.start_election().unwrap();
    assert!(handle.is_leader());
    handle
}

/// Commit a snapshot holding `data`
pub fn commit_snapshot(
    store: &SnapshotStore,
    name: &str,
    log_position: i64,
    data: &[u8],
) -> SnapshotMetadata {
    let mut writer = store.create_temporary_snapshot(name, log_position).unwrap();
    writer.write(data).unwrap();
    writer.validate_and_commit(checksum(data)).unwrap()
}

/// Deterministic bytes for snapshot payloads
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
