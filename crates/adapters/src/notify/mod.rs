// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Side-effect notification adapters

mod logged;

pub use logged::LogNotifier;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifier, NotifyCall};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification failed: {0}")]
    Failed(String),
}

/// Delivers side-effect notifications outside the broker
#[async_trait]
pub trait Notifier: Clone + Send + Sync + 'static {
    async fn send(&self, channel: &str, message: &str) -> Result<(), NotifyError>;
}
