// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic stream processing over the partition log
//!
//! Followers replay committed events into state. The leader first replays
//! everything committed before it took over, then processes new commands:
//! follow-up records are appended, state is committed, the response is sent
//! and side effects run, in that order.

mod dispatch;
mod snapshot;
mod state;
mod writer;

pub use dispatch::{apply_event, process_command, CommandProcessor, ProcessingResult};
pub use snapshot::{compact_journal, load_snapshot, take_snapshot, STATE_SNAPSHOT};
pub use state::{PartitionState, SharedState, VariableState};
pub use writer::LogWriter;

use crate::consensus::{RaftEntry, RaftError, RaftHandle};
use keel_adapters::{Notifier, ResponseWriter};
use keel_core::config::ProcessingConfig;
use keel_core::{
    Clock, Delivery, Intent, PartitionId, Record, RecordError, RecordType, SideEffect,
    TracedEffect, ValueType,
};
use keel_storage::{
    Journal, JournalError, JournalReader, LogEntry, SnapshotMetadata, SnapshotStore,
    SnapshotStoreError,
};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::watch;
use tracing::Instrument;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
    #[error("raft error: {0}")]
    Raft(#[from] RaftError),
    #[error("record error: {0}")]
    Record(#[from] RecordError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotStoreError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no applier for {value_type:?} {intent:?} events")]
    NoApplier { value_type: ValueType, intent: Intent },
    #[error("log has a gap: last position {last_position}, next record at {position}")]
    Gap { last_position: i64, position: i64 },
}

impl ProcessingError {
    pub fn is_not_leader(&self) -> bool {
        matches!(self, ProcessingError::Raft(RaftError::NotLeader { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Apply events only
    Replay,
    /// Process commands and write their results
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Replaying,
    Processing,
    Paused,
    Failed,
}

/// Control and inspection of a running processor
#[derive(Clone)]
pub struct ProcessorHandle {
    phase: watch::Receiver<Phase>,
    paused: Arc<watch::Sender<bool>>,
    state: SharedState,
}

impl ProcessorHandle {
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    /// Stop reading the log after the current record
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Copy of the current state
    pub fn state(&self) -> PartitionState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn shared_state(&self) -> SharedState {
        self.state.clone()
    }
}

/// Everything a processor needs from its partition
pub struct ProcessorContext<C, R, N> {
    pub raft: RaftHandle,
    pub snapshots: SnapshotStore,
    pub clock: C,
    pub responses: R,
    pub notifier: N,
    pub config: ProcessingConfig,
}

pub struct StreamProcessor<C: Clock, R: ResponseWriter, N: Notifier> {
    partition: PartitionId,
    journal: Journal,
    snapshots: SnapshotStore,
    writer: Option<LogWriter<C>>,
    responses: R,
    notifier: N,
    config: ProcessingConfig,
    mode: Mode,
    /// Leader only: last index that must be replayed before processing
    replay_until: Option<u64>,
    state: SharedState,
    phase: watch::Sender<Phase>,
    pause: Arc<watch::Sender<bool>>,
    paused: watch::Receiver<bool>,
}

impl<C: Clock, R: ResponseWriter, N: Notifier> StreamProcessor<C, R, N> {
    /// Processor that only replays events
    pub fn follower(ctx: ProcessorContext<C, R, N>) -> Self {
        Self::new(ctx, false)
    }

    /// Processor that replays up to the leader's first entry of its term,
    /// then processes commands
    pub fn leader(ctx: ProcessorContext<C, R, N>) -> Self {
        Self::new(ctx, true)
    }

    fn new(ctx: ProcessorContext<C, R, N>, leader: bool) -> Self {
        let journal = ctx.raft.journal().clone();
        let partition = ctx.raft.partition();
        let (replay_until, writer) = if leader {
            let writer = LogWriter::new(ctx.raft, ctx.snapshots.clone(), ctx.clock);
            (journal.last_index(), Some(writer))
        } else {
            (None, None)
        };
        let (phase, _) = watch::channel(Phase::Replaying);
        let (pause, paused) = watch::channel(false);
        Self {
            partition,
            journal,
            snapshots: ctx.snapshots,
            writer,
            responses: ctx.responses,
            notifier: ctx.notifier,
            config: ctx.config,
            mode: Mode::Replay,
            replay_until,
            state: Arc::new(Mutex::new(PartitionState::default())),
            phase,
            pause: Arc::new(pause),
            paused,
        }
    }

    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle {
            phase: self.phase.subscribe(),
            paused: self.pause.clone(),
            state: self.state.clone(),
        }
    }

    /// Run until `shutdown` flips to true, its sender is dropped, or
    /// processing fails
    ///
    /// Losing leadership while writing ends the run without an error.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ProcessingError> {
        tracing::info!(
            partition = %self.partition,
            leader = self.writer.is_some(),
            "stream processor started"
        );
        match self.process_log(&mut shutdown).await {
            Ok(()) => {
                tracing::info!(partition = %self.partition, "stream processor stopped");
                Ok(())
            }
            Err(e) if e.is_not_leader() => {
                tracing::info!(partition = %self.partition, "stream processor stopped, no longer leader");
                Ok(())
            }
            Err(e) => {
                tracing::error!(partition = %self.partition, error = %e, "stream processor failed");
                self.set_phase(Phase::Failed);
                Err(e)
            }
        }
    }

    async fn process_log(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ProcessingError> {
        let mut reader = self.recover()?;
        let mut commits = self.journal.subscribe_commits();
        loop {
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                return Ok(());
            }
            let paused = *self.paused.borrow();
            if paused && !self.wait_while_paused(shutdown).await {
                return Ok(());
            }
            if self.replayed_term_start(&reader) {
                self.start_processing(&mut reader);
            }

            let _ = commits.borrow_and_update();
            match reader.next() {
                Some(entry) => self.handle_entry(entry?, &mut reader, shutdown).await?,
                None => {
                    tokio::select! {
                        changed = commits.changed() => {
                            if changed.is_err() {
                                return Ok(());
                            }
                        }
                        _ = shutdown.changed() => {}
                        _ = self.paused.changed() => {}
                    }
                }
            }
        }
    }

    /// Leader only: whether everything before this term has been replayed
    fn replayed_term_start(&self, reader: &JournalReader) -> bool {
        self.writer.is_some()
            && self.mode == Mode::Replay
            && self.replay_until.map_or(true, |end| reader.position() > end)
    }

    /// Load the newest snapshot and position a committed reader after it
    fn recover(&self) -> Result<JournalReader, ProcessingError> {
        let mut reader = self.journal.open_committed_reader();
        if let Some(snapshot) = self.snapshots.latest()? {
            self.install(&snapshot, &mut reader)?;
        }
        self.set_phase(Phase::Replaying);
        Ok(reader)
    }

    fn install(
        &self,
        snapshot: &SnapshotMetadata,
        reader: &mut JournalReader,
    ) -> Result<(), ProcessingError> {
        let recovered = load_snapshot(&self.snapshots, snapshot)?;
        *self.lock_state() = recovered;
        reader.seek_to_asqn(snapshot.log_position);
        tracing::info!(partition = %self.partition, %snapshot, "recovered state from snapshot");
        Ok(())
    }

    fn start_processing(&mut self, reader: &mut JournalReader) {
        let last_processed = self.lock_state().last_processed_position;
        if last_processed > 0 {
            reader.seek_to_asqn(last_processed);
        } else {
            reader.seek_to_first();
        }
        self.mode = Mode::Processing;
        self.set_phase(Phase::Processing);
        tracing::info!(
            partition = %self.partition,
            last_processed_position = last_processed,
            "replay complete, processing commands"
        );
    }

    /// Returns false if shutdown was requested while paused
    async fn wait_while_paused(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let resume = *self.phase.borrow();
        self.set_phase(Phase::Paused);
        tracing::info!(partition = %self.partition, "stream processor paused");
        while *self.paused.borrow_and_update() {
            tokio::select! {
                _ = self.paused.changed() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return false;
                    }
                }
            }
        }
        self.set_phase(resume);
        tracing::info!(partition = %self.partition, "stream processor resumed");
        true
    }

    async fn handle_entry(
        &mut self,
        entry: LogEntry,
        reader: &mut JournalReader,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ProcessingError> {
        let raft_entry = RaftEntry::decode(entry.index, &entry.payload)?;
        let Some(data) = raft_entry.data() else {
            return Ok(());
        };
        let record = Record::from_bytes(data)?;

        let last_position = self.lock_state().last_position;
        if record.position > last_position + 1 {
            return self
                .recover_gap(last_position, record.position, reader, shutdown)
                .await;
        }
        match self.mode {
            Mode::Replay if record.position > last_position => self.replay(&record),
            Mode::Replay => Ok(()),
            Mode::Processing => self.process(record, shutdown).await,
        }
    }

    fn replay(&self, record: &Record) -> Result<(), ProcessingError> {
        let mut state = self.lock_state();
        match record.record_type {
            RecordType::Event => {
                apply_event(&mut state, record)?;
                state.last_processed_position =
                    state.last_processed_position.max(record.source_position);
            }
            RecordType::CommandRejection => {
                state.last_processed_position =
                    state.last_processed_position.max(record.source_position);
            }
            RecordType::Command => {}
        }
        state.last_position = record.position;
        Ok(())
    }

    async fn process(
        &mut self,
        record: Record,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ProcessingError> {
        let last_processed = {
            let mut state = self.lock_state();
            state.last_position = state.last_position.max(record.position);
            state.last_processed_position
        };
        if !record.is_command() || record.position <= last_processed {
            return Ok(());
        }
        let Some(writer) = &self.writer else {
            return Ok(());
        };

        let result = process_command(&self.lock_state(), &record)?;
        let rejected = result.is_rejection();
        let written = writer.write(result.records)?;
        {
            let mut state = self.lock_state();
            for event in written.iter().filter(|r| r.is_event()) {
                apply_event(&mut state, event)?;
            }
            if let Some(last) = written.last() {
                state.last_written_position = last.position;
            }
            state.last_processed_position = record.position;
        }
        tracing::debug!(
            partition = %self.partition,
            position = record.position,
            value_type = ?record.value_type,
            intent = ?record.intent,
            rejected,
            "processed command"
        );

        if let Some(response) = result.response {
            if let Err(e) = self.responses.send(response).await {
                tracing::warn!(partition = %self.partition, error = %e, "failed to send command response");
            }
        }
        for effect in result.side_effects {
            self.run_side_effect(effect, shutdown).await;
        }
        Ok(())
    }

    /// Deliver one side effect
    ///
    /// At-least-once effects are retried until delivered or shutdown.
    async fn run_side_effect(&self, effect: SideEffect, shutdown: &mut watch::Receiver<bool>) {
        let span = tracing::info_span!(
            "side_effect",
            partition = %self.partition,
            kind = effect.name(),
            channel = %effect.channel
        );
        let backoff = self.config.side_effect_retry_backoff;
        async {
            let mut attempt = 1u32;
            loop {
                let error = match self.notifier.send(&effect.channel, &effect.message).await {
                    Ok(()) => {
                        tracing::debug!(attempt, "side effect delivered");
                        return;
                    }
                    Err(e) => e,
                };
                if effect.delivery == Delivery::AtMostOnce {
                    tracing::warn!(error = %error, "side effect dropped");
                    return;
                }
                tracing::warn!(
                    error = %error,
                    attempt,
                    retry_in_ms = backoff.as_millis() as u64,
                    "side effect failed, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::warn!("shutting down before side effect was delivered");
                            return;
                        }
                    }
                }
                attempt += 1;
            }
        }
        .instrument(span)
        .await
    }

    /// Skip a hole in the log using a snapshot that covers it
    ///
    /// Followers wait for one to be replicated. The leader cannot recover.
    async fn recover_gap(
        &self,
        last_position: i64,
        position: i64,
        reader: &mut JournalReader,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), ProcessingError> {
        if self.writer.is_some() {
            return Err(ProcessingError::Gap {
                last_position,
                position,
            });
        }
        tracing::info!(
            partition = %self.partition,
            last_position,
            position,
            "log has a gap, waiting for a snapshot"
        );
        let mut snapshots = self.snapshots.subscribe();
        loop {
            if let Some(snapshot) = self.snapshots.latest()? {
                if snapshot.log_position >= position - 1 {
                    return self.install(&snapshot, reader);
                }
            }
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        return Err(ProcessingError::Gap { last_position, position });
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            tracing::debug!(partition = %self.partition, ?phase, "processor phase");
            *current = phase;
            true
        });
    }

    fn lock_state(&self) -> MutexGuard<'_, PartitionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
