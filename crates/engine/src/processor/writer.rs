// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::ProcessingError;
use crate::consensus::RaftHandle;
use keel_core::{Clock, Record};
use keel_storage::SnapshotStore;

/// Appends records to the partition log on the leader
///
/// Positions continue from the highest one in the journal, or from the
/// newest snapshot when the journal was reset and holds no records yet.
#[derive(Clone)]
pub struct LogWriter<C: Clock> {
    raft: RaftHandle,
    snapshots: SnapshotStore,
    clock: C,
}

impl<C: Clock> LogWriter<C> {
    pub fn new(raft: RaftHandle, snapshots: SnapshotStore, clock: C) -> Self {
        Self {
            raft,
            snapshots,
            clock,
        }
    }

    /// Stamp and append `records` as one batch
    ///
    /// Returns the records with their positions and timestamps filled in.
    pub fn write(&self, records: Vec<Record>) -> Result<Vec<Record>, ProcessingError> {
        if records.is_empty() {
            return Ok(records);
        }
        let timestamp = self.clock.epoch_millis();
        let floor = self.snapshots.get_current_snapshot_index().max(0);
        self.raft
            .append_with(|raft| -> Result<Vec<Record>, ProcessingError> {
                let mut position = raft.journal().last_asqn().max(floor);
                let mut written = Vec::with_capacity(records.len());
                for mut record in records {
                    position += 1;
                    record.position = position;
                    record.timestamp = timestamp;
                    raft.append(position, record.to_bytes()?)?;
                    written.push(record);
                }
                Ok(written)
            })
    }
}
