// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster endpoint: one request and one response per connection

use keel_adapters::protocol::{self, ProtocolError, DEFAULT_TIMEOUT};
use keel_adapters::RequestHandler;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, error};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

/// Handle a single peer connection
pub async fn handle_connection<H: RequestHandler + ?Sized>(
    handler: &H,
    stream: TcpStream,
) -> Result<(), ServerError> {
    let peer = stream.peer_addr().ok();
    let (mut reader, mut writer) = stream.into_split();

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(ProtocolError::Timeout) => {
            error!(?peer, "Request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(ProtocolError::ConnectionClosed) => {
            debug!(?peer, "Peer disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!(?peer, "Failed to read request: {}", e);
            return Err(ServerError::Protocol(e));
        }
    };

    let kind = request.kind();
    let partition = request.partition();
    let response = handler.handle(request).await;
    debug!(?peer, request = kind, %partition, response = response.kind(), "handled request");

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT)
        .await
        .map_err(ServerError::Protocol)?;

    Ok(())
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
