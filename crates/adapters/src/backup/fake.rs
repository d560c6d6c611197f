// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake backup store for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{
    check_file_name, Backup, BackupDescriptor, BackupError, BackupIdentifier, BackupStatus,
    BackupStatusCode, BackupStore, NamedFiles,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Recorded backup store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupCall {
    GetStatus(BackupIdentifier),
    Restore(BackupIdentifier),
    Save(BackupIdentifier),
}

/// Backup content held in memory
#[derive(Debug, Clone, Default)]
pub struct FakeBackup {
    pub checkpoint_position: i64,
    pub snapshot_id: Option<String>,
    pub segments: BTreeMap<String, Vec<u8>>,
    pub snapshot: BTreeMap<String, Vec<u8>>,
}

#[derive(Default)]
struct FakeState {
    statuses: HashMap<BackupIdentifier, BackupStatus>,
    backups: HashMap<BackupIdentifier, FakeBackup>,
    calls: Vec<BackupCall>,
}

/// Fake backup store for testing
#[derive(Clone, Default)]
pub struct FakeBackupStore {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a completed backup
    pub fn add_backup(&self, id: BackupIdentifier, backup: FakeBackup) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .statuses
            .insert(id, BackupStatus::new(id, BackupStatusCode::Completed));
        state.backups.insert(id, backup);
    }

    /// Override the status reported for a backup
    pub fn set_status(&self, id: BackupIdentifier, code: BackupStatusCode) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.statuses.insert(id, BackupStatus::new(id, code));
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<BackupCall> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }
}

#[async_trait]
impl BackupStore for FakeBackupStore {
    async fn get_status(&self, id: &BackupIdentifier) -> Result<BackupStatus, BackupError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(BackupCall::GetStatus(*id));
        Ok(state
            .statuses
            .get(id)
            .cloned()
            .unwrap_or_else(|| BackupStatus::new(*id, BackupStatusCode::DoesNotExist)))
    }

    async fn restore(
        &self,
        id: &BackupIdentifier,
        target_dir: &Path,
    ) -> Result<Backup, BackupError> {
        let backup = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.calls.push(BackupCall::Restore(*id));
            state
                .backups
                .get(id)
                .cloned()
                .ok_or(BackupError::NotFound(*id))?
        };

        let segments = write_files(&backup.segments, &target_dir.join("segments"))?;
        let snapshot = write_files(&backup.snapshot, &target_dir.join("snapshot"))?;
        Ok(Backup {
            id: *id,
            descriptor: BackupDescriptor {
                checkpoint_position: backup.checkpoint_position,
                snapshot_id: backup.snapshot_id,
            },
            segments,
            snapshot,
        })
    }

    async fn save(&self, backup: &Backup) -> Result<(), BackupError> {
        let mut fake = FakeBackup {
            checkpoint_position: backup.descriptor.checkpoint_position,
            snapshot_id: backup.descriptor.snapshot_id.clone(),
            ..FakeBackup::default()
        };
        for (name, path) in &backup.segments {
            fake.segments.insert(name.clone(), std::fs::read(path)?);
        }
        for (name, path) in &backup.snapshot {
            fake.snapshot.insert(name.clone(), std::fs::read(path)?);
        }
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .push(BackupCall::Save(backup.id));
        self.add_backup(backup.id, fake);
        Ok(())
    }
}

fn write_files(files: &BTreeMap<String, Vec<u8>>, dir: &Path) -> Result<NamedFiles, BackupError> {
    let mut written = NamedFiles::new();
    if files.is_empty() {
        return Ok(written);
    }
    std::fs::create_dir_all(dir)?;
    for (name, bytes) in files {
        check_file_name(name)?;
        let path = dir.join(name);
        std::fs::write(&path, bytes)?;
        written.insert(name.clone(), path);
    }
    Ok(written)
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
