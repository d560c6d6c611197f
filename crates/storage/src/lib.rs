// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable partition storage: the journal and the snapshot store

pub mod journal;
pub mod snapshot;

pub use journal::{FrameError, Journal, JournalError, JournalReader, LogEntry, ASQN_IGNORE};
pub use snapshot::{
    checksum, SnapshotMetadata, SnapshotStore, SnapshotStoreError, SnapshotWriter, DATA_FILE,
    METADATA_FILE, METADATA_VERSION,
};
