// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client response adapters

mod channel;

pub use channel::ChannelResponseWriter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeResponseWriter;

use async_trait::async_trait;
use keel_core::CommandResponse;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RespondError {
    #[error("response for request {0} could not be delivered")]
    Undeliverable(u64),
}

/// Delivers command responses to waiting clients
#[async_trait]
pub trait ResponseWriter: Clone + Send + Sync + 'static {
    async fn send(&self, response: CommandResponse) -> Result<(), RespondError>;
}
