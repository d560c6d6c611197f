// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-core: shared model for the keel broker
//!
//! This crate provides:
//! - Node, partition and checkpoint identifiers
//! - The clock abstraction used for record timestamps
//! - The record model consumed by the stream processor
//! - Deferred side effects and client responses
//! - Broker configuration

pub mod clock;
pub mod config;
pub mod effect;
pub mod id;
pub mod record;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{BrokerConfig, ConfigError};
pub use effect::{CommandResponse, Delivery, SideEffect, TracedEffect};
pub use id::{CheckpointId, NodeId, PartitionId};
pub use record::{
    Intent, JobValue, Record, RecordError, RecordType, Rejection, RejectionType, ValueType,
    VariableValue, UNSET_POSITION,
};
