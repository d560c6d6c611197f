// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP transport: one connection per request

use super::{ClusterTransport, TransportError};
use crate::protocol::{self, ProtocolError, Request, Response};
use async_trait::async_trait;
use keel_core::NodeId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

#[derive(Clone)]
pub struct TcpTransport {
    addresses: Arc<HashMap<NodeId, String>>,
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(addresses: HashMap<NodeId, String>, timeout: Duration) -> Self {
        Self {
            addresses: Arc::new(addresses),
            timeout,
        }
    }
}

#[async_trait]
impl ClusterTransport for TcpTransport {
    async fn request(&self, node: NodeId, request: Request) -> Result<Response, TransportError> {
        let address = self
            .addresses
            .get(&node)
            .ok_or(TransportError::UnknownNode(node))?;

        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(address.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(node))?
            .map_err(|e| TransportError::Unreachable(node, e.to_string()))?;
        let (mut reader, mut writer) = stream.into_split();

        let result = async {
            protocol::write_request(&mut writer, &request, self.timeout).await?;
            protocol::read_response(&mut reader, self.timeout).await
        }
        .await;

        match result {
            Ok(response) => Ok(response),
            Err(ProtocolError::Timeout) => Err(TransportError::Timeout(node)),
            Err(ProtocolError::ConnectionClosed) => Err(TransportError::Unreachable(
                node,
                "connection closed".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "tcp_tests.rs"]
mod tests;
