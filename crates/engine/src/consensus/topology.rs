// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Who leads each partition, as far as this broker knows

use super::RoleState;
use keel_core::{NodeId, PartitionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Answers "who is the leader of this partition"
pub trait LeaderDirectory: Send + Sync + 'static {
    fn current_leader(&self, partition: PartitionId) -> Option<NodeId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartitionView {
    term: u64,
    leader: Option<NodeId>,
}

/// Leader and term per partition
///
/// Updates carrying an older term than the one recorded are ignored.
#[derive(Clone, Default)]
pub struct ClusterTopology {
    partitions: Arc<Mutex<HashMap<PartitionId, PartitionView>>>,
}

impl ClusterTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, partition: PartitionId, state: RoleState) {
        let mut partitions = self.partitions.lock().unwrap_or_else(|e| e.into_inner());
        let view = PartitionView {
            term: state.term,
            leader: state.leader,
        };
        match partitions.get(&partition) {
            Some(current) if current.term > view.term => {}
            Some(current) if *current == view => {}
            _ => {
                tracing::debug!(%partition, term = view.term, leader = ?view.leader, "topology changed");
                partitions.insert(partition, view);
            }
        }
    }

    pub fn term(&self, partition: PartitionId) -> Option<u64> {
        self.partitions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&partition)
            .map(|v| v.term)
    }
}

impl LeaderDirectory for ClusterTopology {
    fn current_leader(&self, partition: PartitionId) -> Option<NodeId> {
        self.partitions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&partition)
            .and_then(|v| v.leader)
    }
}

#[cfg(test)]
#[path = "topology_tests.rs"]
mod tests;
