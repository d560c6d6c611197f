// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Answers requests from other brokers
//!
//! Vote and append requests go to the partition's Raft core. Snapshot
//! requests are only served by the partition leader.

use crate::consensus::RaftHandle;
use async_trait::async_trait;
use keel_adapters::protocol::{
    ErrorCode, ErrorResponse, FetchSnapshotChunkRequest, Request, Response,
};
use keel_adapters::RequestHandler;
use keel_core::PartitionId;
use keel_storage::{SnapshotStore, SnapshotStoreError};
use std::collections::HashMap;
use std::sync::Arc;

/// Serves snapshot listings and chunks from one partition's store
#[derive(Clone)]
pub struct SnapshotRequestHandler {
    store: SnapshotStore,
}

impl SnapshotRequestHandler {
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Response {
        match self.store.list() {
            Ok(snapshots) => Response::ListSnapshots(snapshots),
            Err(e) => internal(e),
        }
    }

    /// Read the requested range, clamped to the snapshot length
    pub fn fetch_chunk(&self, req: &FetchSnapshotChunkRequest) -> Response {
        match self.store.read_chunk(
            &req.name,
            req.log_position,
            req.chunk_offset,
            req.chunk_length,
        ) {
            Ok(data) => Response::FetchSnapshotChunk(data),
            Err(SnapshotStoreError::NotFound { name, log_position }) => {
                Response::Error(ErrorResponse::new(
                    ErrorCode::SnapshotNotFound,
                    format!("no snapshot {}@{}", name, log_position),
                ))
            }
            Err(e) => internal(e),
        }
    }
}

fn internal(e: impl std::fmt::Display) -> Response {
    Response::Error(ErrorResponse::new(ErrorCode::Internal, e.to_string()))
}

/// Everything a broker serves for one partition
#[derive(Clone)]
pub struct PartitionEndpoint {
    pub raft: RaftHandle,
    pub snapshots: SnapshotRequestHandler,
}

impl PartitionEndpoint {
    pub fn new(raft: RaftHandle, store: SnapshotStore) -> Self {
        Self {
            raft,
            snapshots: SnapshotRequestHandler::new(store),
        }
    }
}

/// Routes requests to the partitions hosted by this broker
#[derive(Clone, Default)]
pub struct BrokerRequestHandler {
    partitions: Arc<HashMap<PartitionId, PartitionEndpoint>>,
}

impl BrokerRequestHandler {
    pub fn new(endpoints: impl IntoIterator<Item = PartitionEndpoint>) -> Self {
        let partitions = endpoints
            .into_iter()
            .map(|e| (e.raft.partition(), e))
            .collect();
        Self {
            partitions: Arc::new(partitions),
        }
    }

    fn dispatch(&self, endpoint: &PartitionEndpoint, request: &Request) -> Response {
        match request {
            Request::RequestVote(req) => match endpoint.raft.handle_vote_request(req) {
                Ok(vote) => Response::RequestVote(vote),
                Err(e) => internal(e),
            },
            Request::AppendEntries(req) => match endpoint.raft.handle_append_request(req) {
                Ok(append) => Response::AppendEntries(append),
                Err(e) => internal(e),
            },
            Request::ListSnapshots(_) | Request::FetchSnapshotChunk(_) => {
                let role = endpoint.raft.role_state();
                if !role.is_leader() {
                    let leader = role
                        .leader
                        .map(|l| format!("leader is {}", l))
                        .unwrap_or_else(|| "leader unknown".to_string());
                    return Response::Error(ErrorResponse::new(
                        ErrorCode::NotLeader,
                        format!("not the leader of partition {}, {}", request.partition(), leader),
                    ));
                }
                match request {
                    Request::FetchSnapshotChunk(req) => endpoint.snapshots.fetch_chunk(req),
                    _ => endpoint.snapshots.list(),
                }
            }
        }
    }
}

#[async_trait]
impl RequestHandler for BrokerRequestHandler {
    async fn handle(&self, request: Request) -> Response {
        let partition = request.partition();
        let Some(endpoint) = self.partitions.get(&partition) else {
            return Response::Error(ErrorResponse::new(
                ErrorCode::PartitionNotFound,
                format!("partition {} is not hosted here", partition),
            ));
        };
        let response = self.dispatch(endpoint, &request);
        if let Response::Error(e) = &response {
            tracing::debug!(%partition, request = request.kind(), code = %e.code, message = %e.message, "request refused");
        }
        response
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
