// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restoring a broker's partitions from backups
//!
//! Restore only ever targets an empty data directory. A partition is rebuilt
//! from the first completed backup any broker holds for the checkpoint, then
//! its journal is cut back so the checkpoint entry is the last one.

use keel_adapters::{Backup, BackupError, BackupIdentifier, BackupStore};
use keel_core::config::JournalConfig;
use keel_core::{BrokerConfig, CheckpointId, NodeId, PartitionId};
use keel_storage::{Journal, JournalError, SnapshotStore, SnapshotStoreError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::task::JoinSet;

/// Backup files are downloaded here, inside the partition directory
const STAGING_DIR: &str = "restore-staging";

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("data directory {0} is not empty")]
    DirectoryNotEmpty(PathBuf),
    #[error("no completed backup of partition {partition} for checkpoint {checkpoint}")]
    BackupNotFound {
        partition: PartitionId,
        checkpoint: CheckpointId,
    },
    #[error(
        "partition {partition}: checkpoint position {checkpoint_position} not found in restored journal \
         (first entry position {first_position:?}, last entry position {last_position:?})"
    )]
    CheckpointNotFound {
        partition: PartitionId,
        checkpoint_position: i64,
        first_position: Option<i64>,
        last_position: Option<i64>,
    },
    #[error("backup error: {0}")]
    Backup(#[from] BackupError),
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotStoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("restore task failed: {0}")]
    Task(String),
}

/// Outcome of restoring one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredPartition {
    pub partition: PartitionId,
    pub backup: BackupIdentifier,
    pub checkpoint_position: i64,
    /// Journal index of the checkpoint entry, now the last entry
    pub last_index: u64,
}

/// Restores one partition's root directory from a backup
pub struct PartitionRestoreService<B: BackupStore> {
    store: B,
    partition: PartitionId,
    root: PathBuf,
    journal: JournalConfig,
}

impl<B: BackupStore> PartitionRestoreService<B> {
    pub fn new(store: B, partition: PartitionId, root: PathBuf, journal: JournalConfig) -> Self {
        Self {
            store,
            partition,
            root,
            journal,
        }
    }

    pub async fn restore(
        &self,
        checkpoint: CheckpointId,
        brokers: &[NodeId],
    ) -> Result<RestoredPartition, RestoreError> {
        ensure_empty(&self.root)?;
        let id = self.find_backup(checkpoint, brokers).await?;
        tracing::info!(partition = %self.partition, backup = %id, "restoring partition from backup");

        let staging = self.root.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging).await?;
        let backup = self.store.restore(&id, &staging).await?;
        self.install(&backup).await?;
        let last_index = self.trim_to_checkpoint(backup.descriptor.checkpoint_position)?;
        tokio::fs::remove_dir_all(&staging).await?;

        tracing::info!(
            partition = %self.partition,
            backup = %id,
            checkpoint_position = backup.descriptor.checkpoint_position,
            last_index,
            "restored partition"
        );
        Ok(RestoredPartition {
            partition: self.partition,
            backup: id,
            checkpoint_position: backup.descriptor.checkpoint_position,
            last_index,
        })
    }

    /// First broker, in the given order, with a completed backup
    async fn find_backup(
        &self,
        checkpoint: CheckpointId,
        brokers: &[NodeId],
    ) -> Result<BackupIdentifier, RestoreError> {
        for &node in brokers {
            let id = BackupIdentifier::new(node, self.partition, checkpoint);
            let status = self.store.get_status(&id).await?;
            if status.is_completed() {
                return Ok(id);
            }
            tracing::debug!(partition = %self.partition, backup = %id, code = ?status.code, "skipping backup");
        }
        Err(RestoreError::BackupNotFound {
            partition: self.partition,
            checkpoint,
        })
    }

    /// Move segments into the partition root and restore the snapshot
    async fn install(&self, backup: &Backup) -> Result<(), RestoreError> {
        for (name, path) in &backup.segments {
            tokio::fs::rename(path, self.root.join(name)).await?;
        }
        if let Some(snapshot_id) = &backup.descriptor.snapshot_id {
            SnapshotStore::open(&self.root)?.restore(snapshot_id, &backup.snapshot)?;
        }
        Ok(())
    }

    /// Delete every entry after the checkpoint entry
    fn trim_to_checkpoint(&self, checkpoint_position: i64) -> Result<u64, RestoreError> {
        let journal = Journal::open(&self.root, &self.journal)?;
        let mut reader = journal.open_reader();
        if !reader.seek_to_asqn(checkpoint_position) {
            return Err(RestoreError::CheckpointNotFound {
                partition: self.partition,
                checkpoint_position,
                first_position: journal.first_entry()?.map(|e| e.asqn),
                last_position: journal.last_entry()?.map(|e| e.asqn),
            });
        }
        let index = reader.position();
        journal.delete_after(index)?;
        journal.flush()?;
        Ok(index)
    }
}

/// Restores every partition of a broker
pub struct RestoreManager<B: BackupStore> {
    config: BrokerConfig,
    store: B,
}

impl<B: BackupStore> RestoreManager<B> {
    pub fn new(config: BrokerConfig, store: B) -> Self {
        Self { config, store }
    }

    /// Restore all configured partitions at `checkpoint`
    ///
    /// Backups are looked up on `brokers` in order, or on every cluster
    /// member when empty. If any partition fails, the data directory is
    /// emptied again.
    pub async fn restore(
        &self,
        checkpoint: CheckpointId,
        brokers: &[NodeId],
    ) -> Result<Vec<RestoredPartition>, RestoreError> {
        let data_dir = &self.config.data_dir;
        ensure_empty(data_dir)?;
        let brokers = if brokers.is_empty() {
            self.config.member_ids()
        } else {
            brokers.to_vec()
        };
        tracing::info!(%checkpoint, ?brokers, partitions = self.config.partitions.len(), "starting restore");

        let mut tasks = JoinSet::new();
        for &partition in &self.config.partitions {
            let service = PartitionRestoreService::new(
                self.store.clone(),
                partition,
                self.config.partition_dir(partition),
                self.config.journal.clone(),
            );
            let brokers = brokers.clone();
            tasks.spawn(async move { service.restore(checkpoint, &brokers).await });
        }

        let mut restored = Vec::new();
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            let error = match joined {
                Ok(Ok(partition)) => {
                    restored.push(partition);
                    continue;
                }
                Ok(Err(e)) => e,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => RestoreError::Task(e.to_string()),
            };
            if failure.is_none() {
                tasks.abort_all();
                failure = Some(error);
            }
        }

        if let Some(error) = failure {
            tracing::error!(%checkpoint, error = %error, "restore failed, clearing data directory");
            clear_dir(data_dir)?;
            return Err(error);
        }
        restored.sort_by_key(|r| r.partition);
        Ok(restored)
    }
}

/// A missing directory counts as empty
fn ensure_empty(dir: &Path) -> Result<(), RestoreError> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => match entries.next() {
            None => Ok(()),
            Some(_) => Err(RestoreError::DirectoryNotEmpty(dir.to_path_buf())),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Remove everything inside `dir`, keeping `dir` itself
fn clear_dir(dir: &Path) -> Result<(), RestoreError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "restore_tests.rs"]
mod tests;
