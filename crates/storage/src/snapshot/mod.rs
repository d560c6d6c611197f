// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot store
//!
//! ```text
//! <root>/snapshots/<name>-<logPosition>/{snapshot.data, snapshot.metadata}
//! <root>/pending/<name>-<logPosition>-<uuid>/
//! ```
//!
//! Snapshots are staged under `pending/` and renamed into `snapshots/` once
//! their checksum is verified, so a committed directory is always complete.

mod metadata;
mod writer;

pub use metadata::{checksum, SnapshotMetadata, METADATA_VERSION};
pub use writer::SnapshotWriter;

use metadata::{check_name, snapshot_dir_name};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

pub const DATA_FILE: &str = "snapshot.data";
pub const METADATA_FILE: &str = "snapshot.metadata";

const SNAPSHOTS_DIR: &str = "snapshots";
const PENDING_DIR: &str = "pending";

/// Errors from snapshot store operations
#[derive(Debug, Error)]
pub enum SnapshotStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot {name}@{log_position} already exists")]
    AlreadyExists { name: String, log_position: i64 },
    #[error("snapshot {name}@{log_position} not found")]
    NotFound { name: String, log_position: i64 },
    #[error(
        "checksum mismatch for snapshot {name}@{log_position}: expected {expected:#x}, actual {actual:#x}"
    )]
    ChecksumMismatch {
        name: String,
        log_position: i64,
        expected: u64,
        actual: u64,
    },
    #[error("unsupported snapshot metadata version {0}")]
    UnsupportedMetadataVersion(u8),
    #[error("invalid snapshot metadata: {0}")]
    InvalidMetadata(String),
    #[error("snapshot file missing from restore set: {0}")]
    MissingFile(&'static str),
    #[error("snapshot writer is already committed or aborted")]
    WriterClosed,
}

struct StoreInner {
    snapshots_dir: PathBuf,
    pending_dir: PathBuf,
    latest: watch::Sender<Option<SnapshotMetadata>>,
}

/// Committed snapshots of one partition
///
/// Clones share the same directory and notification channel.
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<StoreInner>,
}

impl SnapshotStore {
    /// Open the store under `root`, discarding staging left by a crash
    pub fn open(root: &Path) -> Result<Self, SnapshotStoreError> {
        let snapshots_dir = root.join(SNAPSHOTS_DIR);
        let pending_dir = root.join(PENDING_DIR);
        fs::create_dir_all(&snapshots_dir)?;

        if pending_dir.exists() {
            let mut purged = 0;
            for entry in fs::read_dir(&pending_dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
                purged += 1;
            }
            if purged > 0 {
                tracing::info!(purged, "removed orphaned pending snapshots");
            }
        }
        fs::create_dir_all(&pending_dir)?;

        let (latest, _) = watch::channel(None);
        let store = Self {
            inner: Arc::new(StoreInner {
                snapshots_dir,
                pending_dir,
                latest,
            }),
        };
        let current = store.latest()?;
        store.inner.latest.send_replace(current);
        Ok(store)
    }

    /// Whether a committed snapshot with this identity exists
    pub fn snapshot_exists(&self, name: &str, log_position: i64) -> bool {
        check_name(name).is_ok()
            && self
                .committed_dir(name, log_position)
                .join(METADATA_FILE)
                .is_file()
    }

    /// Start staging a new snapshot
    pub fn create_temporary_snapshot(
        &self,
        name: &str,
        log_position: i64,
    ) -> Result<SnapshotWriter, SnapshotStoreError> {
        check_name(name)?;
        if self.snapshot_exists(name, log_position) {
            return Err(SnapshotStoreError::AlreadyExists {
                name: name.to_string(),
                log_position,
            });
        }
        let staging = self.inner.pending_dir.join(format!(
            "{}-{}",
            snapshot_dir_name(name, log_position),
            uuid::Uuid::new_v4()
        ));
        SnapshotWriter::create(self.clone(), name, log_position, staging)
    }

    /// Log position of the newest snapshot, 0 when there is none
    pub fn get_current_snapshot_index(&self) -> i64 {
        self.inner
            .latest
            .borrow()
            .as_ref()
            .map(|m| m.log_position)
            .unwrap_or(0)
    }

    /// Committed snapshots, oldest first
    pub fn list(&self) -> Result<Vec<SnapshotMetadata>, SnapshotStoreError> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.inner.snapshots_dir)? {
            let path = entry?.path();
            let meta_path = path.join(METADATA_FILE);
            let bytes = match fs::read(&meta_path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match SnapshotMetadata::from_file_bytes(&bytes) {
                Ok(metadata) => snapshots.push(metadata),
                Err(e) => {
                    tracing::warn!(path = %meta_path.display(), error = %e, "skipping unreadable snapshot");
                }
            }
        }
        snapshots.sort_by(|a, b| {
            a.log_position
                .cmp(&b.log_position)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(snapshots)
    }

    /// Newest committed snapshot
    pub fn latest(&self) -> Result<Option<SnapshotMetadata>, SnapshotStoreError> {
        Ok(self.list()?.pop())
    }

    /// Metadata of one committed snapshot
    pub fn metadata(
        &self,
        name: &str,
        log_position: i64,
    ) -> Result<SnapshotMetadata, SnapshotStoreError> {
        check_name(name)?;
        let path = self.committed_dir(name, log_position).join(METADATA_FILE);
        match fs::read(&path) {
            Ok(bytes) => SnapshotMetadata::from_file_bytes(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(SnapshotStoreError::NotFound {
                name: name.to_string(),
                log_position,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Read up to `length` bytes of snapshot data starting at `offset`
    ///
    /// Returns an empty chunk when `offset` is at or past the end.
    pub fn read_chunk(
        &self,
        name: &str,
        log_position: i64,
        offset: u64,
        length: u32,
    ) -> Result<Vec<u8>, SnapshotStoreError> {
        let metadata = self.metadata(name, log_position)?;
        if offset >= metadata.length {
            return Ok(Vec::new());
        }
        let len = (metadata.length - offset).min(u64::from(length));

        let mut file = File::open(self.committed_dir(name, log_position).join(DATA_FILE))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut chunk = Vec::with_capacity(len as usize);
        file.take(len).read_to_end(&mut chunk)?;
        Ok(chunk)
    }

    /// Read and verify the full data of a committed snapshot
    pub fn read_data(
        &self,
        name: &str,
        log_position: i64,
    ) -> Result<Vec<u8>, SnapshotStoreError> {
        let metadata = self.metadata(name, log_position)?;
        let data = fs::read(self.committed_dir(name, log_position).join(DATA_FILE))?;
        let actual = checksum(&data);
        if actual != metadata.checksum {
            return Err(SnapshotStoreError::ChecksumMismatch {
                name: metadata.name,
                log_position,
                expected: metadata.checksum,
                actual,
            });
        }
        Ok(data)
    }

    /// Install a snapshot from backup files
    ///
    /// `files` must hold the data and metadata files by name. The snapshot
    /// is staged, verified and published like a replicated one.
    pub fn restore(
        &self,
        snapshot_id: &str,
        files: &BTreeMap<String, PathBuf>,
    ) -> Result<SnapshotMetadata, SnapshotStoreError> {
        let meta_path = files
            .get(METADATA_FILE)
            .ok_or(SnapshotStoreError::MissingFile(METADATA_FILE))?;
        let data_path = files
            .get(DATA_FILE)
            .ok_or(SnapshotStoreError::MissingFile(DATA_FILE))?;
        let expected = SnapshotMetadata::from_file_bytes(&fs::read(meta_path)?)?;
        if expected.dir_name() != snapshot_id {
            return Err(SnapshotStoreError::InvalidMetadata(format!(
                "backup snapshot {} describes {}",
                snapshot_id,
                expected.dir_name()
            )));
        }

        let mut writer = self.create_temporary_snapshot(&expected.name, expected.log_position)?;
        let mut data = File::open(data_path)?;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = data.read(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write(&buf[..n])?;
        }
        let metadata = writer.validate_and_commit(expected.checksum)?;
        tracing::info!(snapshot = %metadata, "restored snapshot from backup");
        Ok(metadata)
    }

    /// Delete all but the newest `retain` snapshots
    pub fn purge(&self, retain: usize) -> Result<usize, SnapshotStoreError> {
        let snapshots = self.list()?;
        let excess = snapshots.len().saturating_sub(retain.max(1));
        for metadata in &snapshots[..excess] {
            fs::remove_dir_all(self.committed_dir(&metadata.name, metadata.log_position))?;
            tracing::debug!(snapshot = %metadata, "purged snapshot");
        }
        Ok(excess)
    }

    /// Notifications of newly committed snapshots
    pub fn subscribe(&self) -> watch::Receiver<Option<SnapshotMetadata>> {
        self.inner.latest.subscribe()
    }

    fn committed_dir(&self, name: &str, log_position: i64) -> PathBuf {
        self.inner
            .snapshots_dir
            .join(snapshot_dir_name(name, log_position))
    }

    /// Atomically move a verified staging directory into place
    pub(crate) fn publish(
        &self,
        staging: &Path,
        metadata: &SnapshotMetadata,
    ) -> Result<(), SnapshotStoreError> {
        let target = self.committed_dir(&metadata.name, metadata.log_position);
        if target.exists() {
            return Err(SnapshotStoreError::AlreadyExists {
                name: metadata.name.clone(),
                log_position: metadata.log_position,
            });
        }
        fs::rename(staging, &target)?;
        tracing::info!(snapshot = %metadata, length = metadata.length, "committed snapshot");

        self.inner.latest.send_if_modified(|latest| {
            let newer = latest
                .as_ref()
                .map_or(true, |current| metadata.log_position >= current.log_position);
            if newer {
                *latest = Some(metadata.clone());
            }
            newer
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
