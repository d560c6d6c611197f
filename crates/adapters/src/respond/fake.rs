// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake response writer for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{RespondError, ResponseWriter};
use async_trait::async_trait;
use keel_core::CommandResponse;
use std::sync::{Arc, Mutex};

/// Records every response it is asked to send
#[derive(Clone, Default)]
pub struct FakeResponseWriter {
    responses: Arc<Mutex<Vec<CommandResponse>>>,
}

impl FakeResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded responses
    pub fn responses(&self) -> Vec<CommandResponse> {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ResponseWriter for FakeResponseWriter {
    async fn send(&self, response: CommandResponse) -> Result<(), RespondError> {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(response);
        Ok(())
    }
}
