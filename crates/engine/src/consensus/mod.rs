// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consensus role tracking for one partition
//!
//! [`RaftPartition`] is the synchronous core: terms, votes, log matching and
//! commit. [`RaftDriver`] runs its timers and talks to peers.
//! [`RaftHandle`] shares the core between the driver, the request handler
//! and the stream processor and publishes every role change.

mod driver;
mod entry;
mod handle;
mod meta;
mod partition;
mod topology;

pub use driver::RaftDriver;
pub use entry::{EntryKind, RaftEntry};
pub use handle::RaftHandle;
pub use meta::RaftMeta;
pub use partition::RaftPartition;
pub use topology::{ClusterTopology, LeaderDirectory};

use keel_core::NodeId;
use keel_storage::JournalError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the consensus layer
#[derive(Debug, Error)]
pub enum RaftError {
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("not the leader (leader: {leader:?})")]
    NotLeader { leader: Option<NodeId> },
    #[error("malformed entry at index {index}: {reason}")]
    MalformedEntry { index: u64, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// A partition's role as seen by this node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleState {
    pub role: Role,
    pub term: u64,
    pub leader: Option<NodeId>,
}

impl RoleState {
    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }
}
