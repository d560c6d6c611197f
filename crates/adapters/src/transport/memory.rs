// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process transport routing requests to registered handlers
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ClusterTransport, RequestHandler, TransportError};
use crate::protocol::{Request, Response};
use async_trait::async_trait;
use keel_core::NodeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Recorded request
#[derive(Debug, Clone)]
pub struct TransportCall {
    pub node: NodeId,
    pub request: Request,
}

#[derive(Default)]
struct Routes {
    handlers: HashMap<NodeId, Arc<dyn RequestHandler>>,
    down: HashSet<NodeId>,
}

/// Transport that delivers requests to handlers in the same process
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    routes: Arc<Mutex<Routes>>,
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route requests for `node` to `handler`
    pub fn register(&self, node: NodeId, handler: Arc<dyn RequestHandler>) {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .handlers
            .insert(node, handler);
    }

    /// Make `node` unreachable until [`InMemoryTransport::reconnect`]
    pub fn disconnect(&self, node: NodeId) {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .down
            .insert(node);
    }

    pub fn reconnect(&self, node: NodeId) {
        self.routes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .down
            .remove(&node);
    }

    /// Get all recorded requests
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ClusterTransport for InMemoryTransport {
    async fn request(&self, node: NodeId, request: Request) -> Result<Response, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(TransportCall {
                node,
                request: request.clone(),
            });

        let handler = {
            let routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
            if routes.down.contains(&node) {
                return Err(TransportError::Unreachable(node, "disconnected".to_string()));
            }
            routes
                .handlers
                .get(&node)
                .cloned()
                .ok_or(TransportError::UnknownNode(node))?
        };
        Ok(handler.handle(request).await)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
