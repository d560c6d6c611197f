// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notifier that writes notifications to the broker log

use super::{Notifier, NotifyError};
use async_trait::async_trait;

/// Emits every notification as a log event on the `keel::notify` target
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, channel: &str, message: &str) -> Result<(), NotifyError> {
        tracing::info!(target: "keel::notify", channel, message, "notification");
        Ok(())
    }
}
