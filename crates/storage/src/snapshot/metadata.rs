// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot identity and the versioned metadata file
//!
//! The metadata file starts with a version byte. Version 1 is followed by a
//! JSON-encoded [`SnapshotMetadata`].

use super::SnapshotStoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version tag written as the first byte of every metadata file
pub const METADATA_VERSION: u8 = 1;

/// Identity and integrity data of a committed snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub name: String,
    /// Last log position covered by the snapshot
    pub log_position: i64,
    /// Size of the snapshot data in bytes
    pub length: u64,
    pub checksum: u64,
}

impl SnapshotMetadata {
    /// Directory name of the committed snapshot
    pub fn dir_name(&self) -> String {
        snapshot_dir_name(&self.name, self.log_position)
    }

    /// Encode as a metadata file
    pub fn to_file_bytes(&self) -> Result<Vec<u8>, SnapshotStoreError> {
        let mut bytes = vec![METADATA_VERSION];
        serde_json::to_writer(&mut bytes, self)?;
        Ok(bytes)
    }

    /// Decode a metadata file, checking the version byte first
    pub fn from_file_bytes(bytes: &[u8]) -> Result<Self, SnapshotStoreError> {
        let (version, body) = bytes
            .split_first()
            .ok_or_else(|| SnapshotStoreError::InvalidMetadata("empty file".to_string()))?;
        if *version != METADATA_VERSION {
            return Err(SnapshotStoreError::UnsupportedMetadataVersion(*version));
        }
        serde_json::from_slice(body).map_err(|e| SnapshotStoreError::InvalidMetadata(e.to_string()))
    }
}

impl fmt::Display for SnapshotMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.log_position)
    }
}

/// Reject names that would not stay a single directory component
pub(crate) fn check_name(name: &str) -> Result<(), SnapshotStoreError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\');
    if plain {
        Ok(())
    } else {
        Err(SnapshotStoreError::InvalidMetadata(format!(
            "invalid snapshot name {:?}",
            name
        )))
    }
}

pub(crate) fn snapshot_dir_name(name: &str, log_position: i64) -> String {
    format!("{}-{}", name, log_position)
}

/// Checksum of snapshot data
pub fn checksum(data: &[u8]) -> u64 {
    u64::from(crc32fast::hash(data))
}

/// Incremental form of [`checksum`]
#[derive(Default)]
pub(crate) struct ChecksumHasher(crc32fast::Hasher);

impl ChecksumHasher {
    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finish(self) -> u64 {
        u64::from(self.0.finalize())
    }
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
