// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker configuration
//!
//! Loaded from a TOML file. Every field has a default so an empty file (or no
//! file) describes a single-node broker with one partition.

use crate::id::{NodeId, PartitionId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default upper bound for one snapshot chunk on the wire
pub const DEFAULT_MAX_MESSAGE_LENGTH: u32 = 512 * 1024;

/// Errors from loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level broker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    pub node_id: NodeId,
    /// Root of all partition data
    pub data_dir: PathBuf,
    /// Daemon log file
    pub log_path: PathBuf,
    /// Partitions hosted by this broker
    pub partitions: Vec<PartitionId>,
    pub cluster: ClusterConfig,
    pub replication: ReplicationConfig,
    pub snapshot: SnapshotConfig,
    pub journal: JournalConfig,
    pub processing: ProcessingConfig,
    pub raft: RaftConfig,
    pub backup: BackupConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId(0),
            data_dir: PathBuf::from("data"),
            log_path: PathBuf::from("data/keeld.log"),
            partitions: vec![PartitionId(1)],
            cluster: ClusterConfig::default(),
            replication: ReplicationConfig::default(),
            snapshot: SnapshotConfig::default(),
            journal: JournalConfig::default(),
            processing: ProcessingConfig::default(),
            raft: RaftConfig::default(),
            backup: BackupConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partitions.is_empty() {
            return Err(ConfigError::Invalid("no partitions configured".to_string()));
        }
        if self.replication.max_message_length == 0 {
            return Err(ConfigError::Invalid(
                "replication.max_message_length must be positive".to_string(),
            ));
        }
        if !self.cluster.members.is_empty() && self.member(self.node_id).is_none() {
            return Err(ConfigError::Invalid(format!(
                "node {} is not listed in cluster.members",
                self.node_id
            )));
        }
        if self.raft.election_timeout <= self.raft.heartbeat_interval {
            return Err(ConfigError::Invalid(
                "raft.election_timeout must exceed raft.heartbeat_interval".to_string(),
            ));
        }
        Ok(())
    }

    /// Ids of all replicas, including this node
    ///
    /// A broker without configured members forms a cluster of one.
    pub fn member_ids(&self) -> Vec<NodeId> {
        if self.cluster.members.is_empty() {
            return vec![self.node_id];
        }
        let mut ids: Vec<NodeId> = self.cluster.members.iter().map(|m| m.id).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn member(&self, id: NodeId) -> Option<&MemberConfig> {
        self.cluster.members.iter().find(|m| m.id == id)
    }

    /// Directory holding one partition's journal segments and snapshots
    pub fn partition_dir(&self, partition: PartitionId) -> PathBuf {
        self.data_dir.join("partitions").join(partition.to_string())
    }
}

/// Cluster membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    pub members: Vec<MemberConfig>,
    /// Timeout for one request/response round trip
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// One broker in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemberConfig {
    pub id: NodeId,
    /// `host:port` of the broker's cluster endpoint
    pub address: String,
}

/// Follower-side snapshot replication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplicationConfig {
    /// Wall-clock cadence of snapshot list polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Delay before asking for the leader again
    #[serde(with = "humantime_serde")]
    pub leader_retry_backoff: Duration,
    /// Requested length of each snapshot chunk
    pub max_message_length: u32,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            leader_retry_backoff: Duration::from_secs(1),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

/// Snapshotting and compaction on the leader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    #[serde(with = "humantime_serde")]
    pub period: Duration,
    /// Number of committed snapshots kept when purging
    pub retain: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(300),
            retain: 2,
        }
    }
}

/// Journal segment layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JournalConfig {
    /// A segment rolls over once it grows beyond this many bytes
    pub max_segment_size: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            max_segment_size: 128 * 1024 * 1024,
        }
    }
}

/// Stream processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    #[serde(with = "humantime_serde")]
    pub side_effect_retry_backoff: Duration,
    /// Apply events on followers instead of waiting for promotion
    pub replay_on_follower: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            side_effect_retry_backoff: Duration::from_millis(500),
            replay_on_follower: true,
        }
    }
}

/// Consensus timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RaftConfig {
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub election_timeout: Duration,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(250),
            election_timeout: Duration::from_millis(2500),
        }
    }
}

/// Backup store location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupConfig {
    pub store_dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("backups"),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
