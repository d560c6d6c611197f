// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One partition replica and the actors serving it
//!
//! The raft driver runs for the partition's whole life. The remaining
//! actors depend on the role: a leader processes commands and takes
//! snapshots, a follower replicates the leader's snapshots and replays
//! events. Role changes stop one set and start the other.

use crate::consensus::{
    ClusterTopology, RaftDriver, RaftError, RaftHandle, RaftPartition, RoleState,
};
use crate::handler::PartitionEndpoint;
use crate::processor::{
    compact_journal, take_snapshot, LogWriter, ProcessingError, ProcessorContext,
    ProcessorHandle, SharedState, StreamProcessor,
};
use crate::replication::SnapshotReplicationService;
use keel_adapters::{ClusterTransport, Notifier, ResponseWriter};
use keel_core::config::SnapshotConfig;
use keel_core::{BrokerConfig, Clock, PartitionId, Record, RecordType};
use keel_storage::{Journal, JournalError, SnapshotStore, SnapshotStoreError};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotStoreError),
    #[error("raft error: {0}")]
    Raft(#[from] RaftError),
    #[error("processing error: {0}")]
    Processing(#[from] ProcessingError),
    #[error("only commands can be written, got {0:?}")]
    NotACommand(RecordType),
    #[error("partition task failed: {0}")]
    Task(String),
}

/// Which actors a replica runs besides the raft driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DutyKind {
    Leading { term: u64 },
    Following,
}

impl DutyKind {
    fn for_role(role: &RoleState) -> Self {
        if role.is_leader() {
            DutyKind::Leading { term: role.term }
        } else {
            DutyKind::Following
        }
    }
}

struct Duty {
    kind: DutyKind,
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<Result<(), PartitionError>>,
}

impl Duty {
    async fn stop(mut self, partition: PartitionId) {
        self.shutdown.send_replace(true);
        while let Some(joined) = self.tasks.join_next().await {
            if let Some(e) = task_error(joined) {
                tracing::warn!(%partition, error = %e, "partition task failed while stopping");
            }
        }
    }
}

fn task_error(joined: Result<Result<(), PartitionError>, JoinError>) -> Option<PartitionError> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(e) if e.is_cancelled() => None,
        Err(e) => Some(PartitionError::Task(e.to_string())),
    }
}

/// A partition replica on this broker
pub struct Partition<T, R, N, C>
where
    T: ClusterTransport,
    R: ResponseWriter,
    N: Notifier,
    C: Clock,
{
    id: PartitionId,
    config: BrokerConfig,
    raft: RaftHandle,
    snapshots: SnapshotStore,
    transport: T,
    responses: R,
    notifier: N,
    clock: C,
    writer: LogWriter<C>,
    processor: Arc<Mutex<Option<ProcessorHandle>>>,
}

impl<T, R, N, C> Partition<T, R, N, C>
where
    T: ClusterTransport,
    R: ResponseWriter,
    N: Notifier,
    C: Clock,
{
    /// Open the partition's journal, snapshots and raft state
    pub fn open(
        id: PartitionId,
        config: &BrokerConfig,
        topology: ClusterTopology,
        transport: T,
        responses: R,
        notifier: N,
        clock: C,
    ) -> Result<Self, PartitionError> {
        let root = config.partition_dir(id);
        let journal = Journal::open(&root, &config.journal)?;
        let snapshots = SnapshotStore::open(&root)?;
        let raft = RaftPartition::new(id, config.node_id, &config.member_ids(), journal, root)?;
        let raft = RaftHandle::new(raft, topology);
        tracing::info!(
            partition = %id,
            node = %config.node_id,
            last_index = ?raft.journal().last_index(),
            "opened partition"
        );
        Ok(Self {
            id,
            config: config.clone(),
            writer: LogWriter::new(raft.clone(), snapshots.clone(), clock.clone()),
            raft,
            snapshots,
            transport,
            responses,
            notifier,
            clock,
            processor: Arc::new(Mutex::new(None)),
        })
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    pub fn raft(&self) -> &RaftHandle {
        &self.raft
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// What this replica serves to its peers
    pub fn endpoint(&self) -> PartitionEndpoint {
        PartitionEndpoint::new(self.raft.clone(), self.snapshots.clone())
    }

    /// Handle of the running stream processor, if any
    pub fn processor(&self) -> Option<ProcessorHandle> {
        self.processor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Append a client command to the log, returning its position
    ///
    /// Only the leader accepts commands.
    pub fn write_command(&self, command: Record) -> Result<i64, PartitionError> {
        if command.record_type != RecordType::Command {
            return Err(PartitionError::NotACommand(command.record_type));
        }
        let written = self.writer.write(vec![command])?;
        Ok(written.first().map(|r| r.position).unwrap_or_default())
    }

    /// Run the partition until `shutdown` flips to true
    ///
    /// Fails when an actor fails, which leaves leadership to the other
    /// replicas.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), PartitionError> {
        let driver = RaftDriver::new(
            self.raft.clone(),
            self.transport.clone(),
            self.config.raft.clone(),
        );
        let (stop_driver, driver_shutdown) = watch::channel(false);
        let mut driver_task = tokio::spawn(driver.run(driver_shutdown));
        let mut driver_done = false;
        let mut roles = self.raft.subscribe();
        let mut duty: Option<Duty> = None;

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }
            let wanted = DutyKind::for_role(&roles.borrow_and_update());
            if duty.as_ref().map(|d| d.kind) != Some(wanted) {
                if let Some(current) = duty.take() {
                    current.stop(self.id).await;
                }
                tracing::info!(partition = %self.id, duty = ?wanted, "switching partition duty");
                duty = Some(self.start_duty(wanted));
            }

            tokio::select! {
                changed = roles.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
                joined = next_exit(&mut duty) => {
                    if let Some(e) = task_error(joined) {
                        break Err(e);
                    }
                }
                joined = &mut driver_task => {
                    driver_done = true;
                    break match joined {
                        Ok(result) => result.map_err(PartitionError::from),
                        Err(e) => Err(PartitionError::Task(e.to_string())),
                    };
                }
            }
        };

        if let Some(current) = duty.take() {
            current.stop(self.id).await;
        }
        stop_driver.send_replace(true);
        if !driver_done {
            match driver_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(partition = %self.id, error = %e, "raft driver failed"),
                Err(e) => tracing::warn!(partition = %self.id, error = %e, "raft driver task failed"),
            }
        }
        self.set_processor(None);

        match &result {
            Ok(()) => tracing::info!(partition = %self.id, "partition stopped"),
            Err(e) => tracing::error!(partition = %self.id, error = %e, "partition failed"),
        }
        result
    }

    fn start_duty(&self, kind: DutyKind) -> Duty {
        let (shutdown, stopped) = watch::channel(false);
        let mut tasks = JoinSet::new();

        match kind {
            DutyKind::Leading { .. } => {
                let processor = StreamProcessor::leader(self.processor_context());
                let handle = processor.handle();
                let state = handle.shared_state();
                self.set_processor(Some(handle));
                tasks.spawn(run_processor(processor, stopped.clone()));
                tasks.spawn(snapshot_loop(
                    self.id,
                    state,
                    self.snapshots.clone(),
                    self.raft.journal().clone(),
                    self.config.snapshot.clone(),
                    stopped,
                ));
            }
            DutyKind::Following => {
                let replication = SnapshotReplicationService::new(
                    self.id,
                    self.config.node_id,
                    self.snapshots.clone(),
                    self.transport.clone(),
                    self.raft.topology().clone(),
                    self.config.replication.clone(),
                );
                let replication_stopped = stopped.clone();
                tasks.spawn(async move {
                    replication.run(replication_stopped).await;
                    Ok(())
                });
                if self.config.processing.replay_on_follower {
                    let processor = StreamProcessor::follower(self.processor_context());
                    self.set_processor(Some(processor.handle()));
                    tasks.spawn(run_processor(processor, stopped));
                } else {
                    self.set_processor(None);
                }
            }
        }

        Duty {
            kind,
            shutdown,
            tasks,
        }
    }

    fn processor_context(&self) -> ProcessorContext<C, R, N> {
        ProcessorContext {
            raft: self.raft.clone(),
            snapshots: self.snapshots.clone(),
            clock: self.clock.clone(),
            responses: self.responses.clone(),
            notifier: self.notifier.clone(),
            config: self.config.processing.clone(),
        }
    }

    fn set_processor(&self, handle: Option<ProcessorHandle>) {
        *self.processor.lock().unwrap_or_else(|e| e.into_inner()) = handle;
    }
}

/// Resolves when a duty task exits; never while there is none
async fn next_exit(
    duty: &mut Option<Duty>,
) -> Result<Result<(), PartitionError>, JoinError> {
    if let Some(duty) = duty {
        if let Some(joined) = duty.tasks.join_next().await {
            return joined;
        }
    }
    std::future::pending().await
}

async fn run_processor<C: Clock, R: ResponseWriter, N: Notifier>(
    processor: StreamProcessor<C, R, N>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), PartitionError> {
    Ok(processor.run(shutdown).await?)
}

/// Take a snapshot every period, then compact and purge behind it
async fn snapshot_loop(
    partition: PartitionId,
    state: SharedState,
    store: SnapshotStore,
    journal: Journal,
    config: SnapshotConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), PartitionError> {
    let mut interval = tokio::time::interval(config.period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
                continue;
            }
        }
        let snapshot = match take_snapshot(&state, &store, &journal) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(%partition, error = %e, "failed to take snapshot");
                continue;
            }
        };
        if let Err(e) = compact_journal(&journal, snapshot.log_position) {
            tracing::warn!(%partition, error = %e, "failed to compact journal");
        }
        match store.purge(config.retain) {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(%partition, purged, "purged old snapshots"),
            Err(e) => tracing::warn!(%partition, error = %e, "failed to purge snapshots"),
        }
    }
}

#[cfg(test)]
#[path = "partition_tests.rs"]
mod tests;
