// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response writer that completes in-process waiters

use super::{RespondError, ResponseWriter};
use async_trait::async_trait;
use keel_core::CommandResponse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Routes responses to the caller that registered the request id
#[derive(Clone, Default)]
pub struct ChannelResponseWriter {
    waiters: Arc<Mutex<HashMap<u64, oneshot::Sender<CommandResponse>>>>,
}

impl ChannelResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the response to `request_id`
    pub fn register(&self, request_id: u64) -> oneshot::Receiver<CommandResponse> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(request_id, tx);
        rx
    }

    /// Drop the waiter for `request_id`, if any
    pub fn forget(&self, request_id: u64) {
        self.waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&request_id);
    }

    pub fn pending(&self) -> usize {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ResponseWriter for ChannelResponseWriter {
    async fn send(&self, response: CommandResponse) -> Result<(), RespondError> {
        let request_id = response.request_id;
        let waiter = self
            .waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&request_id);
        match waiter {
            Some(tx) => tx
                .send(response)
                .map_err(|_| RespondError::Undeliverable(request_id)),
            None => {
                // Client gave up, or the request came from another broker's log
                tracing::debug!(request_id, "no waiter for response");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
