// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Partition state built by applying events
//!
//! Maps are ordered so the serialized form is identical on every replica
//! that applied the same events.

use keel_core::JobValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// State shared between the processor and snapshotting
pub type SharedState = Arc<Mutex<PartitionState>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableState {
    pub key: i64,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionState {
    /// Key handed to the next created entity
    pub next_key: i64,
    /// Position of the last record read from the log
    pub last_position: i64,
    /// Position of the last command whose results are reflected here
    pub last_processed_position: i64,
    /// Leader only: position of the last follow-up record appended
    ///
    /// State may hold results of records that are not committed yet while
    /// this is ahead of the commit index.
    #[serde(skip)]
    pub last_written_position: i64,
    pub jobs: BTreeMap<i64, JobValue>,
    pub variables: BTreeMap<String, VariableState>,
}

impl Default for PartitionState {
    fn default() -> Self {
        Self {
            next_key: 1,
            last_position: 0,
            last_processed_position: 0,
            last_written_position: 0,
            jobs: BTreeMap::new(),
            variables: BTreeMap::new(),
        }
    }
}

impl PartitionState {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Reserve keys up to and including `key`
    pub(crate) fn observe_key(&mut self, key: i64) {
        self.next_key = self.next_key.max(key + 1);
    }
}
