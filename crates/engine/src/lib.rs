// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Keel partition engine: consensus, snapshot replication, stream
//! processing and restore

pub mod consensus;
mod handler;
mod partition;
pub mod processor;
mod replication;
mod restore;

#[cfg(test)]
mod test_support;

pub use consensus::{
    ClusterTopology, LeaderDirectory, RaftDriver, RaftError, RaftHandle, RaftPartition, Role,
    RoleState,
};
pub use handler::{BrokerRequestHandler, PartitionEndpoint, SnapshotRequestHandler};
pub use partition::{Partition, PartitionError};
pub use processor::{PartitionState, Phase, ProcessingError, ProcessorHandle, StreamProcessor};
pub use replication::{ReplicationError, ReplicationState, SnapshotReplicationService};
pub use restore::{PartitionRestoreService, RestoreError, RestoreManager, RestoredPartition};
