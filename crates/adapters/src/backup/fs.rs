// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup store on a (possibly shared) filesystem
//!
//! ```text
//! <root>/<partition>/<checkpoint>/<node>/status.json
//!                                       /descriptor.json
//!                                       /segments/...
//!                                       /snapshot/...
//! ```

use super::{
    check_file_name, Backup, BackupDescriptor, BackupError, BackupIdentifier, BackupStatus,
    BackupStatusCode, BackupStore, NamedFiles,
};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATUS_FILE: &str = "status.json";
const DESCRIPTOR_FILE: &str = "descriptor.json";
const SEGMENTS_DIR: &str = "segments";
const SNAPSHOT_DIR: &str = "snapshot";

#[derive(Clone, Debug)]
pub struct FsBackupStore {
    root: PathBuf,
}

impl FsBackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn backup_dir(&self, id: &BackupIdentifier) -> PathBuf {
        self.root
            .join(id.partition.to_string())
            .join(id.checkpoint.to_string())
            .join(id.node.to_string())
    }

    /// Record a status without touching the backup content
    pub async fn set_status(&self, status: &BackupStatus) -> Result<(), BackupError> {
        let dir = self.backup_dir(&status.id);
        fs::create_dir_all(&dir).await?;
        write_atomic(&dir.join(STATUS_FILE), &serde_json::to_vec_pretty(status)?).await
    }
}

#[async_trait]
impl BackupStore for FsBackupStore {
    async fn get_status(&self, id: &BackupIdentifier) -> Result<BackupStatus, BackupError> {
        match fs::read(self.backup_dir(id).join(STATUS_FILE)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Ok(BackupStatus::new(*id, BackupStatusCode::DoesNotExist))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn restore(
        &self,
        id: &BackupIdentifier,
        target_dir: &Path,
    ) -> Result<Backup, BackupError> {
        let status = self.get_status(id).await?;
        match status.code {
            BackupStatusCode::Completed => {}
            BackupStatusCode::DoesNotExist => return Err(BackupError::NotFound(*id)),
            code => return Err(BackupError::NotComplete { id: *id, code }),
        }

        let dir = self.backup_dir(id);
        let descriptor: BackupDescriptor =
            serde_json::from_slice(&fs::read(dir.join(DESCRIPTOR_FILE)).await?)?;
        let segments = copy_dir(&dir.join(SEGMENTS_DIR), &target_dir.join(SEGMENTS_DIR)).await?;
        let snapshot = copy_dir(&dir.join(SNAPSHOT_DIR), &target_dir.join(SNAPSHOT_DIR)).await?;

        Ok(Backup {
            id: *id,
            descriptor,
            segments,
            snapshot,
        })
    }

    async fn save(&self, backup: &Backup) -> Result<(), BackupError> {
        let dir = self.backup_dir(&backup.id);
        fs::create_dir_all(&dir).await?;
        self.set_status(&BackupStatus::new(backup.id, BackupStatusCode::InProgress))
            .await?;

        copy_files(&backup.segments, &dir.join(SEGMENTS_DIR)).await?;
        copy_files(&backup.snapshot, &dir.join(SNAPSHOT_DIR)).await?;
        write_atomic(
            &dir.join(DESCRIPTOR_FILE),
            &serde_json::to_vec_pretty(&backup.descriptor)?,
        )
        .await?;

        self.set_status(&BackupStatus::new(backup.id, BackupStatusCode::Completed))
            .await
    }
}

async fn copy_files(files: &NamedFiles, target: &Path) -> Result<NamedFiles, BackupError> {
    fs::create_dir_all(target).await?;
    let mut copied = NamedFiles::new();
    for (name, source) in files {
        check_file_name(name)?;
        let dest = target.join(name);
        fs::copy(source, &dest).await?;
        copied.insert(name.clone(), dest);
    }
    Ok(copied)
}

async fn copy_dir(source: &Path, target: &Path) -> Result<NamedFiles, BackupError> {
    let mut files = NamedFiles::new();
    let mut entries = match fs::read_dir(source).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        files.insert(name, entry.path());
    }
    copy_files(&files, target).await
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BackupError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
