// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared access to a partition's Raft core

use super::{ClusterTopology, RaftError, RaftPartition, RoleState};
use keel_adapters::protocol::{AppendRequest, AppendResponse, VoteRequest, VoteResponse};
use keel_core::{NodeId, PartitionId};
use keel_storage::Journal;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};

/// Cloneable handle to a [`RaftPartition`]
///
/// Every call that may change the role publishes the result to the cluster
/// topology and to role subscribers.
#[derive(Clone)]
pub struct RaftHandle {
    partition: PartitionId,
    node: NodeId,
    journal: Journal,
    raft: Arc<Mutex<RaftPartition>>,
    topology: ClusterTopology,
    roles: Arc<watch::Sender<RoleState>>,
    appended: Arc<Notify>,
}

impl RaftHandle {
    pub fn new(raft: RaftPartition, topology: ClusterTopology) -> Self {
        let state = raft.state();
        let partition = raft.partition();
        topology.record(partition, state);
        let (roles, _) = watch::channel(state);
        Self {
            partition,
            node: raft.node_id(),
            journal: raft.journal().clone(),
            raft: Arc::new(Mutex::new(raft)),
            topology,
            roles: Arc::new(roles),
            appended: Arc::new(Notify::new()),
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    pub fn peers(&self) -> Vec<NodeId> {
        self.with(|raft| raft.peers().to_vec())
    }

    pub fn role_state(&self) -> RoleState {
        *self.roles.borrow()
    }

    pub fn is_leader(&self) -> bool {
        self.role_state().is_leader()
    }

    /// Role changes, starting with the current role
    pub fn subscribe(&self) -> watch::Receiver<RoleState> {
        self.roles.subscribe()
    }

    fn with<R>(&self, f: impl FnOnce(&mut RaftPartition) -> R) -> R {
        let mut raft = self.raft.lock().unwrap_or_else(|e| e.into_inner());
        let result = f(&mut raft);
        let state = raft.state();
        drop(raft);

        self.topology.record(self.partition, state);
        self.roles.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        result
    }

    pub fn start_election(&self) -> Result<VoteRequest, RaftError> {
        self.with(RaftPartition::start_election)
    }

    pub fn handle_vote_request(&self, req: &VoteRequest) -> Result<VoteResponse, RaftError> {
        self.with(|raft| raft.handle_vote_request(req))
    }

    pub fn handle_vote_response(
        &self,
        from: NodeId,
        resp: &VoteResponse,
    ) -> Result<bool, RaftError> {
        self.with(|raft| raft.handle_vote_response(from, resp))
    }

    pub fn handle_append_request(&self, req: &AppendRequest) -> Result<AppendResponse, RaftError> {
        self.with(|raft| raft.handle_append_request(req))
    }

    pub fn handle_append_response(
        &self,
        from: NodeId,
        resp: &AppendResponse,
    ) -> Result<(), RaftError> {
        self.with(|raft| raft.handle_append_response(from, resp))
    }

    pub fn append_request_for(&self, peer: NodeId) -> Result<AppendRequest, RaftError> {
        self.with(|raft| raft.append_request_for(peer))
    }

    pub fn take_leader_contact(&self) -> bool {
        self.with(RaftPartition::take_leader_contact)
    }

    /// Append application data as leader
    pub fn append(&self, asqn: i64, data: Vec<u8>) -> Result<u64, RaftError> {
        self.append_with(|raft| raft.append(asqn, data))
    }

    /// Run several leader appends under one lock
    ///
    /// The driver is woken afterwards to replicate the new entries.
    pub fn append_with<R, E>(
        &self,
        f: impl FnOnce(&mut RaftPartition) -> Result<R, E>,
    ) -> Result<R, E> {
        let result = self.with(f);
        if result.is_ok() {
            self.appended.notify_one();
        }
        result
    }

    /// Resolves after the next successful append
    pub async fn appended(&self) {
        self.appended.notified().await
    }
}
