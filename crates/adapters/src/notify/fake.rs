// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake notifier for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{Notifier, NotifyError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Recorded notification attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyCall {
    pub channel: String,
    pub message: String,
    pub delivered: bool,
}

#[derive(Default)]
struct FakeState {
    calls: Vec<NotifyCall>,
    failures_left: usize,
}

/// Fake notifier for testing
#[derive(Clone, Default)]
pub struct FakeNotifier {
    state: Arc<Mutex<FakeState>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends
    pub fn fail_next(&self, count: usize) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .failures_left = count;
    }

    /// Get all recorded attempts, failed ones included
    pub fn calls(&self) -> Vec<NotifyCall> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }

    /// Get only the delivered notifications
    pub fn delivered(&self) -> Vec<NotifyCall> {
        self.calls().into_iter().filter(|c| c.delivered).collect()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, channel: &str, message: &str) -> Result<(), NotifyError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let fail = state.failures_left > 0;
        if fail {
            state.failures_left -= 1;
        }
        state.calls.push(NotifyCall {
            channel: channel.to_string(),
            message: message.to_string(),
            delivered: !fail,
        });
        if fail {
            Err(NotifyError::Failed(format!("injected failure on {}", channel)))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
