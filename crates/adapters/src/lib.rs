// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: peers, backups, clients and notifications

pub mod backup;
pub mod notify;
pub mod protocol;
pub mod respond;
pub mod traced;
pub mod transport;

pub use backup::{
    Backup, BackupDescriptor, BackupError, BackupIdentifier, BackupStatus, BackupStatusCode,
    BackupStore, FsBackupStore, NamedFiles,
};
pub use notify::{LogNotifier, Notifier, NotifyError};
pub use protocol::{ErrorCode, ErrorResponse, ProtocolError, Request, Response};
pub use respond::{ChannelResponseWriter, RespondError, ResponseWriter};
pub use traced::{TracedBackupStore, TracedNotifier, TracedTransport};
pub use transport::{ClusterTransport, RequestHandler, TcpTransport, TransportError};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use backup::{BackupCall, FakeBackup, FakeBackupStore};
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifier, NotifyCall};
#[cfg(any(test, feature = "test-support"))]
pub use respond::FakeResponseWriter;
#[cfg(any(test, feature = "test-support"))]
pub use transport::{InMemoryTransport, TransportCall};
