// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Records carried in the application payload of log entries
//!
//! A record is a command (a request to change state), an event (a state change
//! that happened) or a rejection (a command that was refused). Records are
//! serialized as JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position of a record that has not been written yet
pub const UNSET_POSITION: i64 = -1;

/// Errors from record encoding and decoding
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid {value_type:?} value: {reason}")]
    InvalidValue { value_type: ValueType, reason: String },
}

/// Kind of record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Command,
    Event,
    CommandRejection,
}

/// The entity a record is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Job,
    Variable,
}

/// What a record asks for (commands) or reports (events)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Create,
    Created,
    Complete,
    Completed,
    Update,
    Updated,
    Delete,
    Deleted,
}

impl Intent {
    /// Whether this intent names something that already happened
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            Intent::Created | Intent::Completed | Intent::Updated | Intent::Deleted
        )
    }
}

/// Why a command was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionType {
    InvalidArgument,
    NotFound,
    InvalidState,
    AlreadyExists,
    ProcessingError,
}

/// Rejection details attached to a `CommandRejection` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: RejectionType,
    pub reason: String,
}

/// A record in the partition log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Position in the log (the entry's asqn); assigned by the log writer
    pub position: i64,
    /// Position of the command this record was produced from
    pub source_position: i64,
    /// Key of the entity, `-1` for commands that create one
    pub key: i64,
    pub record_type: RecordType,
    pub value_type: ValueType,
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
    /// Client request to answer once the command is processed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    /// Epoch millis stamped by the log writer
    pub timestamp: i64,
    pub value: serde_json::Value,
}

impl Record {
    /// Create a command record
    pub fn command(value_type: ValueType, intent: Intent, value: serde_json::Value) -> Self {
        Self {
            position: UNSET_POSITION,
            source_position: UNSET_POSITION,
            key: -1,
            record_type: RecordType::Command,
            value_type,
            intent,
            rejection: None,
            request_id: None,
            timestamp: 0,
            value,
        }
    }

    /// Create an event record for an entity key
    pub fn event(key: i64, value_type: ValueType, intent: Intent, value: serde_json::Value) -> Self {
        Self {
            key,
            record_type: RecordType::Event,
            ..Self::command(value_type, intent, value)
        }
    }

    /// Create a rejection for this command
    pub fn rejection(&self, kind: RejectionType, reason: impl Into<String>) -> Self {
        Self {
            position: UNSET_POSITION,
            source_position: self.position,
            key: self.key,
            record_type: RecordType::CommandRejection,
            value_type: self.value_type,
            intent: self.intent,
            rejection: Some(Rejection {
                kind,
                reason: reason.into(),
            }),
            request_id: self.request_id,
            timestamp: self.timestamp,
            value: self.value.clone(),
        }
    }

    pub fn with_key(mut self, key: i64) -> Self {
        self.key = key;
        self
    }

    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn is_command(&self) -> bool {
        self.record_type == RecordType::Command
    }

    pub fn is_event(&self) -> bool {
        self.record_type == RecordType::Event
    }

    /// Decode the value into its typed form
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<T, RecordError> {
        serde_json::from_value(self.value.clone()).map_err(|e| RecordError::InvalidValue {
            value_type: self.value_type,
            reason: e.to_string(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RecordError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Value of `Job` records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobValue {
    pub job_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(default)]
    pub deadline: i64,
}

/// Value of `Variable` records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableValue {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
