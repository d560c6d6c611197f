// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::consensus::{ClusterTopology, LeaderDirectory};
use crate::handler::{BrokerRequestHandler, PartitionEndpoint};
use crate::test_support::{eventually, raft_handle};
use keel_adapters::InMemoryTransport;
use keel_core::NodeId;
use keel_storage::SnapshotStore;
use std::sync::Arc;
use tempfile::TempDir;

fn fast_config() -> RaftConfig {
    RaftConfig {
        heartbeat_interval: Duration::from_millis(20),
        election_timeout: Duration::from_millis(100),
    }
}

struct Cluster {
    _dirs: Vec<TempDir>,
    handles: Vec<RaftHandle>,
    shutdowns: Vec<watch::Sender<bool>>,
}

impl Cluster {
    fn stop(&self, node: NodeId) {
        for (handle, shutdown) in self.handles.iter().zip(&self.shutdowns) {
            if handle.node_id() == node {
                shutdown.send_replace(true);
            }
        }
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        for shutdown in &self.shutdowns {
            shutdown.send_replace(true);
        }
    }
}

fn start_cluster(members: &[u32]) -> Cluster {
    let transport = InMemoryTransport::new();
    let mut dirs = Vec::new();
    let mut handles = Vec::new();
    let mut shutdowns = Vec::new();
    for id in members {
        let dir = TempDir::new().unwrap();
        let handle = raft_handle(dir.path(), *id, members, ClusterTopology::new());
        let store = SnapshotStore::open(dir.path()).unwrap();
        let handler = BrokerRequestHandler::new([PartitionEndpoint::new(handle.clone(), store)]);
        transport.register(NodeId(*id), Arc::new(handler));

        let driver = RaftDriver::new(handle.clone(), transport.clone(), fast_config());
        let (shutdown, stopped) = watch::channel(false);
        tokio::spawn(driver.run(stopped));
        dirs.push(dir);
        handles.push(handle);
        shutdowns.push(shutdown);
    }
    Cluster {
        _dirs: dirs,
        handles,
        shutdowns,
    }
}

fn leaders(cluster: &Cluster) -> Vec<RaftHandle> {
    cluster
        .handles
        .iter()
        .filter(|h| h.is_leader())
        .cloned()
        .collect()
}

#[tokio::test]
async fn single_node_elects_itself() {
    let cluster = start_cluster(&[1]);
    let handle = cluster.handles[0].clone();
    assert!(eventually(Duration::from_secs(5), || handle.is_leader()).await);
    assert_eq!(handle.journal().commit_index(), Some(0));
}

#[tokio::test]
async fn three_nodes_agree_on_one_leader() {
    let cluster = start_cluster(&[1, 2, 3]);
    assert!(eventually(Duration::from_secs(5), || leaders(&cluster).len() == 1).await);

    let leader = leaders(&cluster).remove(0);
    let term = leader.role_state().term;
    let followers_agree = eventually(Duration::from_secs(5), || {
        cluster.handles.iter().all(|h| {
            let state = h.role_state();
            state.term == term && state.leader == Some(leader.node_id())
        })
    })
    .await;
    assert!(followers_agree);
    assert_eq!(
        leader.topology().current_leader(crate::test_support::PARTITION),
        Some(leader.node_id())
    );
}

#[tokio::test]
async fn appended_entries_reach_every_follower() {
    let cluster = start_cluster(&[1, 2, 3]);
    assert!(eventually(Duration::from_secs(5), || leaders(&cluster).len() == 1).await);
    let leader = leaders(&cluster).remove(0);

    let index = leader.append(1, b"record".to_vec()).unwrap();

    let replicated = eventually(Duration::from_secs(5), || {
        cluster
            .handles
            .iter()
            .all(|h| h.journal().commit_index() >= Some(index))
    })
    .await;
    assert!(replicated);
    for handle in &cluster.handles {
        let entry = handle.journal().entry(index).unwrap().unwrap();
        assert_eq!(entry.asqn, 1);
    }
}

#[tokio::test]
async fn new_leader_is_elected_when_leader_stops() {
    let cluster = start_cluster(&[1, 2, 3]);
    assert!(eventually(Duration::from_secs(5), || leaders(&cluster).len() == 1).await);
    let old = leaders(&cluster).remove(0);
    let old_term = old.role_state().term;

    cluster.stop(old.node_id());

    let replaced = eventually(Duration::from_secs(5), || {
        cluster.handles.iter().any(|h| {
            h.node_id() != old.node_id() && h.is_leader() && h.role_state().term > old_term
        })
    })
    .await;
    assert!(replaced);
}
