// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel broker daemon: hosts partition replicas and serves cluster requests

pub mod lifecycle;
pub mod server;

pub use lifecycle::{startup, Broker, BrokerPartition, LifecycleError, PartitionTasks, LOCK_FILE};
pub use server::{handle_connection, ServerError};
