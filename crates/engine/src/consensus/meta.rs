// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable term and vote

use super::RaftError;
use keel_core::NodeId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const META_FILE: &str = "raft.json";

/// Term and vote, persisted before any message that depends on them is sent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftMeta {
    pub term: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voted_for: Option<NodeId>,
}

impl RaftMeta {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(META_FILE)
    }

    /// Load from `dir`; a missing file is a fresh node
    pub fn load(dir: &Path) -> Result<Self, RaftError> {
        match fs::read(Self::path(dir)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write atomically via a temp file and rename
    pub fn store(&self, dir: &Path) -> Result<(), RaftError> {
        let path = Self::path(dir);
        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(self)?)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "meta_tests.rs"]
mod tests;
