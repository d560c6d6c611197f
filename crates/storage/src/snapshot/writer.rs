// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Staged snapshot writer

use super::metadata::ChecksumHasher;
use super::{SnapshotMetadata, SnapshotStore, SnapshotStoreError, DATA_FILE, METADATA_FILE};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Committed,
    Aborted,
}

/// Writes one snapshot into a private staging directory
///
/// Nothing is visible in the store until [`SnapshotWriter::validate_and_commit`]
/// succeeds. Dropping an uncommitted writer aborts it.
pub struct SnapshotWriter {
    store: SnapshotStore,
    name: String,
    log_position: i64,
    staging: PathBuf,
    file: Option<BufWriter<File>>,
    hasher: Option<ChecksumHasher>,
    written: u64,
    state: WriterState,
}

impl std::fmt::Debug for SnapshotWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotWriter")
            .field("name", &self.name)
            .field("log_position", &self.log_position)
            .field("staging", &self.staging)
            .field("written", &self.written)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SnapshotWriter {
    pub(crate) fn create(
        store: SnapshotStore,
        name: &str,
        log_position: i64,
        staging: PathBuf,
    ) -> Result<Self, SnapshotStoreError> {
        fs::create_dir_all(&staging)?;
        let file = match File::create(staging.join(DATA_FILE)) {
            Ok(file) => file,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e.into());
            }
        };
        tracing::debug!(name, log_position, staging = %staging.display(), "opened snapshot writer");

        Ok(Self {
            store,
            name: name.to_string(),
            log_position,
            staging,
            file: Some(BufWriter::new(file)),
            hasher: Some(ChecksumHasher::default()),
            written: 0,
            state: WriterState::Open,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_position(&self) -> i64 {
        self.log_position
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append bytes to the staged data
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), SnapshotStoreError> {
        let (Some(file), Some(hasher)) = (self.file.as_mut(), self.hasher.as_mut()) else {
            return Err(SnapshotStoreError::WriterClosed);
        };
        file.write_all(bytes)?;
        hasher.update(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Verify the staged data against `expected_checksum` and publish it
    ///
    /// On any failure the staging directory is removed and the writer is
    /// aborted.
    pub fn validate_and_commit(
        &mut self,
        expected_checksum: u64,
    ) -> Result<SnapshotMetadata, SnapshotStoreError> {
        if self.state != WriterState::Open {
            return Err(SnapshotStoreError::WriterClosed);
        }
        let result = self.commit(expected_checksum);
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn commit(&mut self, expected_checksum: u64) -> Result<SnapshotMetadata, SnapshotStoreError> {
        let (Some(file), Some(hasher)) = (self.file.take(), self.hasher.take()) else {
            return Err(SnapshotStoreError::WriterClosed);
        };
        let file = file.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        let actual = hasher.finish();
        if actual != expected_checksum {
            return Err(SnapshotStoreError::ChecksumMismatch {
                name: self.name.clone(),
                log_position: self.log_position,
                expected: expected_checksum,
                actual,
            });
        }

        let metadata = SnapshotMetadata {
            name: self.name.clone(),
            log_position: self.log_position,
            length: self.written,
            checksum: actual,
        };
        let mut meta_file = File::create(self.staging.join(METADATA_FILE))?;
        meta_file.write_all(&metadata.to_file_bytes()?)?;
        meta_file.sync_all()?;

        self.store.publish(&self.staging, &metadata)?;
        self.state = WriterState::Committed;
        Ok(metadata)
    }

    /// Discard the staged data; calling it again does nothing
    pub fn abort(&mut self) {
        if self.state != WriterState::Open {
            return;
        }
        self.state = WriterState::Aborted;
        self.file = None;
        self.hasher = None;
        match fs::remove_dir_all(&self.staging) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(staging = %self.staging.display(), error = %e, "failed to remove snapshot staging");
            }
        }
        tracing::debug!(name = %self.name, log_position = self.log_position, "aborted snapshot writer");
    }

    pub fn is_open(&self) -> bool {
        self.state == WriterState::Open
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        self.abort();
    }
}
