// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timers and peer traffic for one partition's Raft core

use super::{RaftError, RaftHandle, Role};
use keel_adapters::protocol::{Request, Response};
use keel_adapters::ClusterTransport;
use keel_core::config::RaftConfig;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Drives elections and replication for one partition
///
/// Election timeouts are staggered by node id instead of randomized.
pub struct RaftDriver<T: ClusterTransport> {
    handle: RaftHandle,
    transport: T,
    config: RaftConfig,
}

impl<T: ClusterTransport> RaftDriver<T> {
    pub fn new(handle: RaftHandle, transport: T, config: RaftConfig) -> Self {
        Self {
            handle,
            transport,
            config,
        }
    }

    fn election_timeout(&self) -> Duration {
        let stagger = self.handle.node_id().0 % 8;
        self.config.election_timeout + self.config.heartbeat_interval * stagger
    }

    /// Bound on one peer round trip, so a dead peer cannot stall heartbeats
    fn round_timeout(&self) -> Duration {
        self.config.election_timeout / 2
    }

    /// Run until `shutdown` flips to true or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), RaftError> {
        let partition = self.handle.partition();
        tracing::info!(%partition, timeout_ms = self.election_timeout().as_millis() as u64, "raft driver started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.handle.is_leader() {
                self.replicate().await?;
                tokio::select! {
                    _ = tokio::time::sleep(self.config.heartbeat_interval) => {}
                    _ = self.handle.appended() => {}
                    _ = shutdown.changed() => break,
                }
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(self.election_timeout()) => {}
                    _ = shutdown.changed() => break,
                }
                if !self.handle.take_leader_contact() {
                    self.elect().await?;
                }
            }
        }

        tracing::info!(%partition, "raft driver stopped");
        Ok(())
    }

    async fn elect(&self) -> Result<(), RaftError> {
        let request = self.handle.start_election()?;
        if self.handle.is_leader() {
            return Ok(());
        }

        let mut pending = JoinSet::new();
        for peer in self.handle.peers() {
            let transport = self.transport.clone();
            let request = Request::RequestVote(request.clone());
            let timeout = self.round_timeout();
            pending.spawn(async move {
                (peer, tokio::time::timeout(timeout, transport.request(peer, request)).await)
            });
        }

        while let Some(joined) = pending.join_next().await {
            let Ok((peer, result)) = joined else {
                continue;
            };
            match result {
                Ok(Ok(Response::RequestVote(vote))) => {
                    if self.handle.handle_vote_response(peer, &vote)? {
                        break;
                    }
                }
                Ok(Ok(Response::Error(e))) => {
                    tracing::debug!(%peer, code = %e.code, message = %e.message, "vote request refused");
                }
                Ok(Ok(other)) => {
                    tracing::warn!(%peer, response = other.kind(), "unexpected response to vote request");
                }
                Ok(Err(e)) => tracing::debug!(%peer, error = %e, "vote request failed"),
                Err(_) => tracing::debug!(%peer, "vote request timed out"),
            }
            if self.handle.role_state().role != Role::Candidate {
                break;
            }
        }
        Ok(())
    }

    async fn replicate(&self) -> Result<(), RaftError> {
        let mut pending = JoinSet::new();
        for peer in self.handle.peers() {
            let transport = self.transport.clone();
            let request = Request::AppendEntries(self.handle.append_request_for(peer)?);
            let timeout = self.round_timeout();
            pending.spawn(async move {
                (peer, tokio::time::timeout(timeout, transport.request(peer, request)).await)
            });
        }

        while let Some(joined) = pending.join_next().await {
            let Ok((peer, result)) = joined else {
                continue;
            };
            match result {
                Ok(Ok(Response::AppendEntries(response))) => {
                    self.handle.handle_append_response(peer, &response)?;
                }
                Ok(Ok(Response::Error(e))) => {
                    tracing::debug!(%peer, code = %e.code, message = %e.message, "append refused");
                }
                Ok(Ok(other)) => {
                    tracing::warn!(%peer, response = other.kind(), "unexpected response to append");
                }
                Ok(Err(e)) => tracing::debug!(%peer, error = %e, "append failed"),
                Err(_) => tracing::debug!(%peer, "append timed out"),
            }
            if !self.handle.is_leader() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
