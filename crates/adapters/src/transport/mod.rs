// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response transport between brokers

mod tcp;

pub use tcp::TcpTransport;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod memory;
#[cfg(any(test, feature = "test-support"))]
pub use memory::{InMemoryTransport, TransportCall};

use crate::protocol::{ProtocolError, Request, Response};
use async_trait::async_trait;
use keel_core::NodeId;
use thiserror::Error;

/// Errors from sending a request to another broker
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("node {0} is unreachable: {1}")]
    Unreachable(NodeId, String),
    #[error("request to node {0} timed out")]
    Timeout(NodeId),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Sends requests to other brokers in the cluster
#[async_trait]
pub trait ClusterTransport: Clone + Send + Sync + 'static {
    async fn request(&self, node: NodeId, request: Request) -> Result<Response, TransportError>;
}

/// Answers requests arriving from other brokers
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: Request) -> Response;
}
