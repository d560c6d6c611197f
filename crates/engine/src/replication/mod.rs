// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Follower-side snapshot replication
//!
//! One actor per follower partition polls the leader for its snapshots and
//! copies the missing ones chunk by chunk. Only one snapshot and one chunk
//! are ever in flight. Nothing about the progress is persisted; after a
//! restart missing snapshots are found again through the store.

use crate::consensus::LeaderDirectory;
use keel_adapters::protocol::{
    ErrorResponse, FetchSnapshotChunkRequest, ListSnapshotsRequest, Request, Response,
};
use keel_adapters::{ClusterTransport, TransportError};
use keel_core::config::ReplicationConfig;
use keel_core::{NodeId, PartitionId};
use keel_storage::{SnapshotMetadata, SnapshotStore, SnapshotStoreError, SnapshotWriter};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;

/// Why replicating one snapshot failed
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("leader answered {code}: {message}")]
    Remote { code: String, message: String },
    #[error("unexpected {0} response")]
    UnexpectedResponse(&'static str),
    #[error("snapshot store error: {0}")]
    Store(#[from] SnapshotStoreError),
    #[error("leader sent an empty chunk at offset {offset} of {length}")]
    EmptyChunk { offset: u64, length: u64 },
}

impl From<ErrorResponse> for ReplicationError {
    fn from(e: ErrorResponse) -> Self {
        ReplicationError::Remote {
            code: e.code.to_string(),
            message: e.message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationState {
    AwaitingLeader,
    Polling,
    Replicating,
    Idle,
    Closed,
}

/// Snapshot replication actor for one follower partition
pub struct SnapshotReplicationService<T: ClusterTransport, L: LeaderDirectory> {
    partition: PartitionId,
    node: NodeId,
    store: SnapshotStore,
    transport: T,
    leaders: L,
    config: ReplicationConfig,
    leader: Option<NodeId>,
    queue: VecDeque<SnapshotMetadata>,
    writer: Option<SnapshotWriter>,
    last_poll: Option<Instant>,
    state: watch::Sender<ReplicationState>,
}

impl<T: ClusterTransport, L: LeaderDirectory> SnapshotReplicationService<T, L> {
    pub fn new(
        partition: PartitionId,
        node: NodeId,
        store: SnapshotStore,
        transport: T,
        leaders: L,
        config: ReplicationConfig,
    ) -> Self {
        let (state, _) = watch::channel(ReplicationState::AwaitingLeader);
        Self {
            partition,
            node,
            store,
            transport,
            leaders,
            config,
            leader: None,
            queue: VecDeque::new(),
            writer: None,
            last_poll: None,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ReplicationState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ReplicationState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::trace!(partition = %self.partition, ?state, "replication state");
            *current = state;
            true
        });
    }

    /// Run until `shutdown` flips to true or its sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(partition = %self.partition, "snapshot replication started");
        let mut state = ReplicationState::AwaitingLeader;
        while !*shutdown.borrow() {
            self.set_state(state);
            tokio::select! {
                next = self.step(state) => state = next,
                _ = shutdown.changed() => break,
            }
        }
        self.close();
    }

    async fn step(&mut self, state: ReplicationState) -> ReplicationState {
        match state {
            ReplicationState::AwaitingLeader => self.await_leader().await,
            ReplicationState::Polling => self.poll().await,
            ReplicationState::Replicating => self.replicate_next().await,
            ReplicationState::Idle => self.idle().await,
            ReplicationState::Closed => ReplicationState::Closed,
        }
    }

    async fn await_leader(&mut self) -> ReplicationState {
        match self.leaders.current_leader(self.partition) {
            Some(leader) if leader != self.node => {
                if self.leader != Some(leader) {
                    tracing::debug!(partition = %self.partition, %leader, "replicating snapshots from leader");
                }
                self.leader = Some(leader);
                ReplicationState::Polling
            }
            _ => {
                self.leader = None;
                tokio::time::sleep(self.config.leader_retry_backoff).await;
                ReplicationState::AwaitingLeader
            }
        }
    }

    async fn poll(&mut self) -> ReplicationState {
        let Some(leader) = self.leader else {
            return ReplicationState::AwaitingLeader;
        };
        self.last_poll = Some(Instant::now());

        let request = Request::ListSnapshots(ListSnapshotsRequest {
            partition: self.partition,
        });
        let snapshots = match self.transport.request(leader, request).await {
            Ok(Response::ListSnapshots(snapshots)) => snapshots,
            Ok(Response::Error(e)) => {
                tracing::warn!(
                    partition = %self.partition,
                    %leader,
                    code = %e.code,
                    message = %e.message,
                    "leader refused to list snapshots"
                );
                return self.back_off().await;
            }
            Ok(other) => {
                tracing::warn!(partition = %self.partition, %leader, response = other.kind(), "unexpected response to snapshot listing");
                return self.back_off().await;
            }
            Err(e) => {
                tracing::warn!(partition = %self.partition, %leader, error = %e, "failed to list snapshots");
                return self.back_off().await;
            }
        };

        let current = self.store.get_current_snapshot_index();
        for snapshot in snapshots {
            let missing = !self.store.snapshot_exists(&snapshot.name, snapshot.log_position);
            if missing && snapshot.log_position >= current && !self.queue.contains(&snapshot) {
                tracing::debug!(partition = %self.partition, %snapshot, "queued snapshot");
                self.queue.push_back(snapshot);
            }
        }
        if self.queue.is_empty() {
            ReplicationState::Idle
        } else {
            ReplicationState::Replicating
        }
    }

    async fn back_off(&mut self) -> ReplicationState {
        self.leader = None;
        tokio::time::sleep(self.config.leader_retry_backoff).await;
        ReplicationState::AwaitingLeader
    }

    async fn replicate_next(&mut self) -> ReplicationState {
        let (Some(snapshot), Some(leader)) = (self.queue.pop_front(), self.leader) else {
            return ReplicationState::Idle;
        };
        match self.replicate(leader, &snapshot).await {
            Ok(()) => {
                tracing::info!(partition = %self.partition, %snapshot, "replicated snapshot");
            }
            Err(ReplicationError::Remote { code, message }) => {
                tracing::warn!(partition = %self.partition, %snapshot, %code, %message, "leader refused snapshot chunk");
            }
            Err(e) => {
                tracing::warn!(partition = %self.partition, %snapshot, error = %e, "snapshot replication failed");
            }
        }
        if let Some(mut writer) = self.writer.take() {
            writer.abort();
        }
        if self.queue.is_empty() {
            ReplicationState::Idle
        } else {
            ReplicationState::Replicating
        }
    }

    /// Copy one snapshot, chunk after chunk, and commit it
    async fn replicate(
        &mut self,
        leader: NodeId,
        snapshot: &SnapshotMetadata,
    ) -> Result<(), ReplicationError> {
        if self
            .store
            .snapshot_exists(&snapshot.name, snapshot.log_position)
        {
            return Ok(());
        }
        let writer = self
            .writer
            .insert(self.store.create_temporary_snapshot(&snapshot.name, snapshot.log_position)?);

        let mut offset = 0u64;
        while offset < snapshot.length {
            let request = Request::FetchSnapshotChunk(FetchSnapshotChunkRequest {
                partition: self.partition,
                name: snapshot.name.clone(),
                log_position: snapshot.log_position,
                chunk_offset: offset,
                chunk_length: self.config.max_message_length,
            });
            let chunk = match self.transport.request(leader, request).await?.into_result()? {
                Response::FetchSnapshotChunk(chunk) => chunk,
                other => return Err(ReplicationError::UnexpectedResponse(other.kind())),
            };
            if chunk.is_empty() {
                return Err(ReplicationError::EmptyChunk {
                    offset,
                    length: snapshot.length,
                });
            }
            writer.write(&chunk)?;
            offset += chunk.len() as u64;
        }
        writer.validate_and_commit(snapshot.checksum)?;
        self.writer = None;
        Ok(())
    }

    /// Wait out the rest of the poll interval, measured from the last poll
    async fn idle(&mut self) -> ReplicationState {
        let elapsed = self.last_poll.map(|t| t.elapsed()).unwrap_or_default();
        let wait = self.config.poll_interval.saturating_sub(elapsed);
        tokio::time::sleep(wait).await;

        // Leadership may have moved while idle
        match self.leaders.current_leader(self.partition) {
            Some(leader) if Some(leader) == self.leader => ReplicationState::Polling,
            _ => ReplicationState::AwaitingLeader,
        }
    }

    fn close(&mut self) {
        self.queue.clear();
        if let Some(mut writer) = self.writer.take() {
            tracing::info!(partition = %self.partition, snapshot = writer.name(), "aborting in-flight snapshot");
            writer.abort();
        }
        self.set_state(ReplicationState::Closed);
        tracing::info!(partition = %self.partition, "snapshot replication stopped");
    }
}

#[cfg(test)]
#[path = "replication_tests.rs"]
mod tests;
