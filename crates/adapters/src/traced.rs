// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::backup::{Backup, BackupError, BackupIdentifier, BackupStatus, BackupStore};
use crate::notify::{Notifier, NotifyError};
use crate::protocol::{Request, Response};
use crate::transport::{ClusterTransport, TransportError};
use async_trait::async_trait;
use keel_core::NodeId;
use std::path::Path;
use tracing::Instrument;

/// Wrapper that adds tracing to any ClusterTransport
#[derive(Clone)]
pub struct TracedTransport<T> {
    inner: T,
}

impl<T> TracedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: ClusterTransport> ClusterTransport for TracedTransport<T> {
    async fn request(&self, node: NodeId, request: Request) -> Result<Response, TransportError> {
        let span = tracing::debug_span!(
            "transport.request",
            node = node.0,
            kind = request.kind(),
            partition = request.partition().0
        );
        async move {
            let start = std::time::Instant::now();
            let result = self.inner.request(node, request).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(Response::Error(e)) => {
                    tracing::warn!(elapsed_ms, code = %e.code, message = %e.message, "error response")
                }
                Ok(_) => tracing::trace!(elapsed_ms, "response"),
                Err(e) => tracing::debug!(elapsed_ms, error = %e, "request failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Wrapper that adds tracing to any BackupStore
#[derive(Clone)]
pub struct TracedBackupStore<B> {
    inner: B,
}

impl<B> TracedBackupStore<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<B: BackupStore> BackupStore for TracedBackupStore<B> {
    async fn get_status(&self, id: &BackupIdentifier) -> Result<BackupStatus, BackupError> {
        let result = self.inner.get_status(id).await;
        match &result {
            Ok(status) => tracing::info!(backup = %id, code = ?status.code, "backup status"),
            Err(e) => tracing::error!(backup = %id, error = %e, "backup status failed"),
        }
        result
    }

    async fn restore(
        &self,
        id: &BackupIdentifier,
        target_dir: &Path,
    ) -> Result<Backup, BackupError> {
        let span = tracing::info_span!("backup.restore", backup = %id, target = %target_dir.display());
        async move {
            tracing::info!("downloading backup");
            let start = std::time::Instant::now();
            let result = self.inner.restore(id, target_dir).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(backup) => tracing::info!(
                    elapsed_ms,
                    segments = backup.segments.len(),
                    snapshot_files = backup.snapshot.len(),
                    checkpoint_position = backup.descriptor.checkpoint_position,
                    "backup downloaded"
                ),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "download failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn save(&self, backup: &Backup) -> Result<(), BackupError> {
        let span = tracing::info_span!("backup.save", backup = %backup.id);
        async move {
            let result = self.inner.save(backup).await;
            match &result {
                Ok(()) => tracing::info!(segments = backup.segments.len(), "backup saved"),
                Err(e) => tracing::error!(error = %e, "save failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Wrapper that adds tracing to any Notifier
#[derive(Clone)]
pub struct TracedNotifier<N> {
    inner: N,
}

impl<N> TracedNotifier<N> {
    pub fn new(inner: N) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<N: Notifier> Notifier for TracedNotifier<N> {
    async fn send(&self, channel: &str, message: &str) -> Result<(), NotifyError> {
        let span = tracing::info_span!("notify.send", channel);
        async move {
            tracing::debug!(message_len = message.len(), "sending");
            let result = self.inner.send(channel, message).await;
            match &result {
                Ok(()) => tracing::debug!("sent"),
                Err(e) => tracing::warn!(error = %e, "send failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
