// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker lifecycle: startup, partition supervision, shutdown

use std::collections::HashMap;
use std::fs::File;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use keel_adapters::{
    ChannelResponseWriter, LogNotifier, TcpTransport, TracedNotifier, TracedTransport,
};
use keel_core::{BrokerConfig, CommandResponse, PartitionId, Record, SystemClock};
use keel_engine::{BrokerRequestHandler, ClusterTopology, Partition, PartitionError};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Partition replica with the broker's concrete adapters
pub type BrokerPartition = Partition<
    TracedTransport<TcpTransport>,
    ChannelResponseWriter,
    TracedNotifier<LogNotifier>,
    SystemClock,
>;

/// Lock file inside the data directory, holding the broker's pid
pub const LOCK_FILE: &str = "broker.lock";

/// Listen address of a broker without cluster members
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:26501";

/// How long shutdown waits for partitions to stop
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to acquire lock: broker already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error("Failed to open partition {0}: {1}")]
    Partition(PartitionId, #[source] PartitionError),

    #[error("Partition {0} is not hosted by this broker")]
    UnknownPartition(PartitionId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Running broker
pub struct Broker {
    pub config: BrokerConfig,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    /// Cluster endpoint listener
    pub listener: TcpListener,
    /// Answers raft and snapshot requests for the hosted partitions
    pub handler: BrokerRequestHandler,
    partitions: HashMap<PartitionId, Arc<BrokerPartition>>,
    responses: ChannelResponseWriter,
    next_request_id: AtomicU64,
    shutdown: watch::Sender<bool>,
    /// Running partitions; one exiting on its own stops the broker
    pub tasks: PartitionTasks,
}

impl Broker {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn partition(&self, id: PartitionId) -> Option<&Arc<BrokerPartition>> {
        self.partitions.get(&id)
    }

    /// Write a client command to a partition and wait for its response
    ///
    /// The returned receiver resolves once the leader has processed the
    /// command. It is dropped unanswered if leadership moves first.
    pub fn submit(
        &self,
        partition: PartitionId,
        command: Record,
    ) -> Result<oneshot::Receiver<CommandResponse>, LifecycleError> {
        let target = self
            .partitions
            .get(&partition)
            .ok_or(LifecycleError::UnknownPartition(partition))?;
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let response = self.responses.register(request_id);
        match target.write_command(command.with_request_id(request_id)) {
            Ok(position) => {
                tracing::debug!(%partition, request_id, position, "command submitted");
                Ok(response)
            }
            Err(e) => {
                self.responses.forget(request_id);
                Err(LifecycleError::Partition(partition, e))
            }
        }
    }

    /// Stop every partition and release the lock
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("Shutting down broker...");
        self.shutdown.send_replace(true);
        self.tasks.stop(SHUTDOWN_TIMEOUT).await;

        let lock_path = self.config.data_dir.join(LOCK_FILE);
        if lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&lock_path) {
                warn!("Failed to remove lock file: {}", e);
            }
        }
        info!("Broker shutdown complete");
        Ok(())
    }
}

/// The running partitions of a broker
pub struct PartitionTasks {
    tasks: JoinSet<(PartitionId, Result<(), PartitionError>)>,
}

impl PartitionTasks {
    /// Wait for the next partition to stop on its own
    ///
    /// Pending forever while every partition runs.
    pub async fn next_exit(&mut self) -> (PartitionId, Result<(), PartitionError>) {
        loop {
            match self.tasks.join_next().await {
                Some(Ok(exit)) => return exit,
                Some(Err(e)) if e.is_cancelled() => continue,
                Some(Err(e)) => {
                    warn!(error = %e, "partition task panicked");
                    continue;
                }
                None => std::future::pending::<()>().await,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    async fn stop(&mut self, timeout: Duration) {
        let stopping = async {
            while let Some(joined) = self.tasks.join_next().await {
                match joined {
                    Ok((partition, Err(e))) => {
                        warn!(%partition, error = %e, "partition stopped with error")
                    }
                    Ok((partition, Ok(()))) => info!(%partition, "partition stopped"),
                    Err(e) => warn!(error = %e, "partition task failed"),
                }
            }
        };
        if tokio::time::timeout(timeout, stopping).await.is_err() {
            warn!("partitions did not stop in time, aborting");
            self.tasks.abort_all();
        }
    }
}

/// Start the broker
pub async fn startup(config: &BrokerConfig) -> Result<Broker, LifecycleError> {
    match startup_inner(config).await {
        Ok(broker) => Ok(broker),
        // Another broker owns the lock file
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            cleanup_on_failure(&config.data_dir);
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &BrokerConfig) -> Result<Broker, LifecycleError> {
    // 1. Acquire lock file FIRST - one broker per data directory
    std::fs::create_dir_all(&config.data_dir)?;
    let lock_file = File::create(config.data_dir.join(LOCK_FILE))?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    use std::io::Write;
    let mut lock_file = lock_file;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    // 2. Open partitions (before binding)
    let transport = TracedTransport::new(TcpTransport::new(
        peer_addresses(config),
        config.cluster.request_timeout,
    ));
    let responses = ChannelResponseWriter::new();
    let notifier = TracedNotifier::new(LogNotifier::new());
    let topology = ClusterTopology::new();
    let mut partitions = HashMap::new();
    for &id in &config.partitions {
        let partition = Partition::open(
            id,
            config,
            topology.clone(),
            transport.clone(),
            responses.clone(),
            notifier.clone(),
            SystemClock,
        )
        .map_err(|e| LifecycleError::Partition(id, e))?;
        partitions.insert(id, Arc::new(partition));
    }
    let handler = BrokerRequestHandler::new(partitions.values().map(|p| p.endpoint()));

    // 3. Bind the cluster endpoint
    let address = listen_address(config);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| LifecycleError::BindFailed(address.clone(), e))?;

    // 4. Start the partitions
    let (shutdown, stopped) = watch::channel(false);
    let mut tasks = JoinSet::new();
    for (&id, partition) in &partitions {
        let partition = Arc::clone(partition);
        let stopped = stopped.clone();
        tasks.spawn(async move { (id, partition.run(stopped).await) });
    }

    info!(
        node = %config.node_id,
        address = %address,
        partitions = partitions.len(),
        "Broker started"
    );

    Ok(Broker {
        config: config.clone(),
        lock_file,
        listener,
        handler,
        partitions,
        responses,
        next_request_id: AtomicU64::new(1),
        shutdown,
        tasks: PartitionTasks { tasks },
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(data_dir: &Path) {
    let lock_path = data_dir.join(LOCK_FILE);
    if lock_path.exists() {
        let _ = std::fs::remove_file(&lock_path);
    }
}

/// Address the cluster endpoint binds to
fn listen_address(config: &BrokerConfig) -> String {
    config
        .member(config.node_id)
        .map(|m| m.address.clone())
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string())
}

/// Addresses of every other cluster member
fn peer_addresses(config: &BrokerConfig) -> HashMap<keel_core::NodeId, String> {
    config
        .cluster
        .members
        .iter()
        .filter(|m| m.id != config.node_id)
        .map(|m| (m.id, m.address.clone()))
        .collect()
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
