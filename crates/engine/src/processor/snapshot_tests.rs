// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use keel_core::config::JournalConfig;
use keel_core::JobValue;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn shared(state: PartitionState) -> SharedState {
    Arc::new(Mutex::new(state))
}

fn empty_journal(dir: &TempDir) -> Journal {
    Journal::open(&dir.path().join("log"), &JournalConfig::default()).unwrap()
}

fn state_at(position: i64) -> PartitionState {
    let mut state = PartitionState {
        last_position: position,
        last_processed_position: position - 1,
        next_key: 2,
        ..PartitionState::default()
    };
    state.jobs.insert(
        1,
        JobValue {
            job_type: "payment".to_string(),
            worker: None,
            deadline: 0,
        },
    );
    state
}

#[test]
fn snapshot_holds_state_at_last_position() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::open(dir.path()).unwrap();
    let journal = empty_journal(&dir);
    let state = state_at(42);

    let metadata = take_snapshot(&shared(state.clone()), &store, &journal)
        .unwrap()
        .unwrap();

    assert_eq!(metadata.name, STATE_SNAPSHOT);
    assert_eq!(metadata.log_position, 42);
    assert_eq!(load_snapshot(&store, &metadata).unwrap(), state);
}

#[test]
fn nothing_to_snapshot_before_first_record_or_without_progress() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::open(dir.path()).unwrap();
    let journal = empty_journal(&dir);

    assert!(take_snapshot(&shared(PartitionState::default()), &store, &journal)
        .unwrap()
        .is_none());

    take_snapshot(&shared(state_at(10)), &store, &journal)
        .unwrap()
        .unwrap();
    assert!(take_snapshot(&shared(state_at(10)), &store, &journal)
        .unwrap()
        .is_none());
    assert!(take_snapshot(&shared(state_at(11)), &store, &journal)
        .unwrap()
        .is_some());
}

#[test]
fn snapshot_waits_for_written_records_to_commit() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::open(dir.path()).unwrap();
    let journal = empty_journal(&dir);
    // Command at position 1, its follow-up event at position 2
    journal.append(1, vec![1]).unwrap();
    let event_index = journal.append(2, vec![2]).unwrap();
    journal.set_commit_index(0).unwrap();

    let mut state = state_at(1);
    state.last_written_position = 2;
    let state = shared(state);

    assert!(take_snapshot(&state, &store, &journal).unwrap().is_none());
    assert_eq!(store.get_current_snapshot_index(), 0);

    journal.set_commit_index(event_index).unwrap();
    let metadata = take_snapshot(&state, &store, &journal).unwrap().unwrap();
    assert_eq!(metadata.log_position, 1);
}

#[test]
fn snapshot_skipped_when_written_record_is_gone() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::open(dir.path()).unwrap();
    let journal = empty_journal(&dir);
    journal.append(1, vec![1]).unwrap();
    journal.set_commit_index(0).unwrap();

    // The follow-up at position 2 was truncated after a leader change
    let mut state = state_at(1);
    state.last_written_position = 2;

    assert!(take_snapshot(&shared(state), &store, &journal)
        .unwrap()
        .is_none());
}

fn journal_with_positions(dir: &TempDir, count: i64) -> Journal {
    let config = JournalConfig {
        max_segment_size: 64,
    };
    let journal = Journal::open(dir.path(), &config).unwrap();
    for asqn in 1..=count {
        journal.append(asqn, vec![0; 16]).unwrap();
    }
    journal
}

#[test]
fn compaction_keeps_record_at_snapshot_position() {
    let dir = TempDir::new().unwrap();
    let journal = journal_with_positions(&dir, 20);

    let removed = compact_journal(&journal, 15).unwrap();

    assert!(removed > 0);
    let mut reader = journal.open_reader();
    assert!(reader.seek_to_asqn(15));
    assert!(journal.first_index() > 0);
}

#[test]
fn compaction_needs_exact_position() {
    let dir = TempDir::new().unwrap();
    let journal = journal_with_positions(&dir, 20);

    assert_eq!(compact_journal(&journal, 99).unwrap(), 0);
    assert_eq!(journal.first_index(), 0);
}
