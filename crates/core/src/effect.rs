// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deferred side effects and client responses produced by record processing
//!
//! Processors never perform I/O themselves. They describe what should happen
//! and the stream processor performs it after the follow-up records are in the
//! log and state is committed.

use crate::record::{Record, RecordType, Rejection};
use serde::{Deserialize, Serialize};

/// How often a side effect may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    /// Idempotent: retried until it succeeds
    AtLeastOnce,
    /// Not idempotent: attempted once, failure is logged
    AtMostOnce,
}

/// A notification to send once processing of a command is durable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffect {
    pub channel: String,
    pub message: String,
    pub delivery: Delivery,
}

impl SideEffect {
    pub fn at_least_once(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            message: message.into(),
            delivery: Delivery::AtLeastOnce,
        }
    }

    pub fn at_most_once(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            message: message.into(),
            delivery: Delivery::AtMostOnce,
        }
    }
}

/// Answer to a client command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub request_id: u64,
    pub key: i64,
    pub record_type: RecordType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
    pub value: serde_json::Value,
}

impl CommandResponse {
    /// Build a response from the record that answers the request
    ///
    /// Returns None if the record was not written on behalf of a client.
    pub fn for_record(record: &Record) -> Option<Self> {
        Some(Self {
            request_id: record.request_id?,
            key: record.key,
            record_type: record.record_type,
            rejection: record.rejection.clone(),
            value: record.value.clone(),
        })
    }

    pub fn is_rejection(&self) -> bool {
        self.rejection.is_some()
    }
}

/// Trait for operations that should be traced
///
/// Provides consistent naming and structured fields for logging.
pub trait TracedEffect {
    /// Effect name for log spans
    fn name(&self) -> &'static str;

    /// Key-value pairs for structured logging
    fn fields(&self) -> Vec<(&'static str, String)>;
}

impl TracedEffect for SideEffect {
    fn name(&self) -> &'static str {
        match self.delivery {
            Delivery::AtLeastOnce => "side_effect.at_least_once",
            Delivery::AtMostOnce => "side_effect.at_most_once",
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("channel", self.channel.clone()),
            ("message_len", self.message.len().to_string()),
        ]
    }
}
