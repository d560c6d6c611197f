// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup store adapters
//!
//! A backup holds one partition's journal segments and, optionally, its
//! latest snapshot as taken by one broker at a checkpoint.

mod fs;

pub use fs::FsBackupStore;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{BackupCall, FakeBackup, FakeBackupStore};

use async_trait::async_trait;
use keel_core::{CheckpointId, NodeId, PartitionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Files by name
pub type NamedFiles = BTreeMap<String, PathBuf>;

/// Errors from backup store operations
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("backup {0} not found")]
    NotFound(BackupIdentifier),
    #[error("backup {id} is not complete: {code:?}")]
    NotComplete {
        id: BackupIdentifier,
        code: BackupStatusCode,
    },
    #[error("invalid file name in backup: {0}")]
    InvalidFileName(String),
}

/// Identifies one broker's backup of one partition at a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackupIdentifier {
    pub node: NodeId,
    pub partition: PartitionId,
    pub checkpoint: CheckpointId,
}

impl BackupIdentifier {
    pub fn new(node: NodeId, partition: PartitionId, checkpoint: CheckpointId) -> Self {
        Self {
            node,
            partition,
            checkpoint,
        }
    }
}

impl fmt::Display for BackupIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node {} partition {} checkpoint {}",
            self.node, self.partition, self.checkpoint
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStatusCode {
    DoesNotExist,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStatus {
    pub code: BackupStatusCode,
    pub id: BackupIdentifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl BackupStatus {
    pub fn new(id: BackupIdentifier, code: BackupStatusCode) -> Self {
        Self {
            code,
            id,
            failure_reason: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.code == BackupStatusCode::Completed
    }
}

/// What a backup contains, written when the backup was taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDescriptor {
    /// Asqn of the checkpoint entry
    pub checkpoint_position: i64,
    /// Directory name of the included snapshot, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
}

/// A backup whose files are available locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    pub id: BackupIdentifier,
    pub descriptor: BackupDescriptor,
    pub segments: NamedFiles,
    pub snapshot: NamedFiles,
}

/// Adapter for a backup store
#[async_trait]
pub trait BackupStore: Clone + Send + Sync + 'static {
    /// Status of a backup; `DoesNotExist` when there is none
    async fn get_status(&self, id: &BackupIdentifier) -> Result<BackupStatus, BackupError>;

    /// Download a completed backup into `target_dir`
    async fn restore(&self, id: &BackupIdentifier, target_dir: &Path)
        -> Result<Backup, BackupError>;

    /// Store a backup and mark it completed
    async fn save(&self, backup: &Backup) -> Result<(), BackupError>;
}

/// Reject file names that could escape the backup directory
pub(crate) fn check_file_name(name: &str) -> Result<(), BackupError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\');
    if plain {
        Ok(())
    } else {
        Err(BackupError::InvalidFileName(name.to_string()))
    }
}
