// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic state snapshots and the journal compaction they allow

use super::state::{PartitionState, SharedState};
use super::ProcessingError;
use keel_storage::{checksum, Journal, SnapshotMetadata, SnapshotStore};

/// Name under which partition state snapshots are stored
pub const STATE_SNAPSHOT: &str = "state";

/// Persist the current state at its last read position
///
/// Returns None when there is nothing new to snapshot, or while records
/// the state was built from are not committed yet.
pub fn take_snapshot(
    state: &SharedState,
    store: &SnapshotStore,
    journal: &Journal,
) -> Result<Option<SnapshotMetadata>, ProcessingError> {
    let (position, written, bytes) = {
        let state = state.lock().unwrap_or_else(|e| e.into_inner());
        (
            state.last_position,
            state.last_written_position,
            state.to_bytes()?,
        )
    };
    if position <= 0 || position <= store.get_current_snapshot_index() {
        return Ok(None);
    }
    if !is_committed(journal, written) {
        tracing::debug!(
            last_written_position = written,
            commit_index = ?journal.commit_index(),
            "written records not committed, skipping snapshot"
        );
        return Ok(None);
    }
    let mut writer = store.create_temporary_snapshot(STATE_SNAPSHOT, position)?;
    writer.write(&bytes)?;
    let metadata = writer.validate_and_commit(checksum(&bytes))?;
    tracing::info!(snapshot = %metadata, "took snapshot");
    Ok(Some(metadata))
}

/// Whether the record at `position` is at or below the commit index
///
/// Positions of zero or below were never written and count as committed.
fn is_committed(journal: &Journal, position: i64) -> bool {
    if position <= 0 {
        return true;
    }
    let mut reader = journal.open_reader();
    if !reader.seek_to_asqn(position) {
        return false;
    }
    journal
        .commit_index()
        .map_or(false, |commit| reader.position() <= commit)
}

/// Load a committed snapshot as partition state
pub fn load_snapshot(
    store: &SnapshotStore,
    metadata: &SnapshotMetadata,
) -> Result<PartitionState, ProcessingError> {
    let bytes = store.read_data(&metadata.name, metadata.log_position)?;
    Ok(PartitionState::from_bytes(&bytes)?)
}

/// Drop journal segments holding only records at or below `log_position`
///
/// Nothing is deleted unless the journal holds the record at
/// `log_position`, so the snapshot and the log always overlap.
pub fn compact_journal(journal: &Journal, log_position: i64) -> Result<usize, ProcessingError> {
    let mut reader = journal.open_reader();
    if !reader.seek_to_asqn(log_position) {
        return Ok(0);
    }
    let removed = journal.compact(reader.position())?;
    if removed > 0 {
        tracing::debug!(log_position, removed, "compacted journal");
    }
    Ok(removed)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
