// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::consensus::ClusterTopology;
use crate::test_support::{commit_snapshot, eventually, leader_handle, raft_handle};
use keel_adapters::{FakeNotifier, FakeResponseWriter};
use keel_core::{FakeClock, JobValue};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);

struct Fixture {
    _dir: TempDir,
    raft: RaftHandle,
    snapshots: SnapshotStore,
    responses: FakeResponseWriter,
    notifier: FakeNotifier,
    clock: FakeClock,
}

impl Fixture {
    fn leader() -> Self {
        let dir = TempDir::new().unwrap();
        let raft = leader_handle(&dir.path().join("log"));
        Self::with_raft(dir, raft)
    }

    /// Follower of a two-node cluster whose leader never shows up
    fn follower() -> Self {
        let dir = TempDir::new().unwrap();
        let raft = raft_handle(&dir.path().join("log"), 2, &[1, 2], ClusterTopology::new());
        Self::with_raft(dir, raft)
    }

    fn with_raft(dir: TempDir, raft: RaftHandle) -> Self {
        let snapshots = SnapshotStore::open(dir.path()).unwrap();
        Self {
            _dir: dir,
            raft,
            snapshots,
            responses: FakeResponseWriter::new(),
            notifier: FakeNotifier::new(),
            clock: FakeClock::at(1_000),
        }
    }

    fn context(&self) -> ProcessorContext<FakeClock, FakeResponseWriter, FakeNotifier> {
        ProcessorContext {
            raft: self.raft.clone(),
            snapshots: self.snapshots.clone(),
            clock: self.clock.clone(),
            responses: self.responses.clone(),
            notifier: self.notifier.clone(),
            config: ProcessingConfig {
                side_effect_retry_backoff: Duration::from_millis(10),
                replay_on_follower: true,
            },
        }
    }

    fn writer(&self) -> LogWriter<FakeClock> {
        LogWriter::new(self.raft.clone(), self.snapshots.clone(), self.clock.clone())
    }

    fn write(&self, command: Record) -> i64 {
        self.writer().write(vec![command]).unwrap()[0].position
    }

    fn start_leader(&self) -> Running {
        Running::start(StreamProcessor::leader(self.context()))
    }

    fn start_follower(&self) -> Running {
        Running::start(StreamProcessor::follower(self.context()))
    }

    /// Every record in the journal, in log order
    fn records(&self) -> Vec<Record> {
        self.raft
            .journal()
            .open_reader()
            .filter_map(|entry| {
                let entry = entry.unwrap();
                let raft_entry = RaftEntry::decode(entry.index, &entry.payload).unwrap();
                raft_entry.data().map(|data| Record::from_bytes(data).unwrap())
            })
            .collect()
    }

    /// Append a committed record behind raft's back, as replication would
    fn append_committed(&self, record: &Record) {
        let journal = self.raft.journal();
        let entry = RaftEntry::application(1, record.to_bytes().unwrap());
        let index = journal.append(record.position, entry.encode()).unwrap();
        journal.set_commit_index(index).unwrap();
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), ProcessingError>>,
    handle: ProcessorHandle,
}

impl Running {
    fn start(processor: StreamProcessor<FakeClock, FakeResponseWriter, FakeNotifier>) -> Self {
        let handle = processor.handle();
        let (shutdown, stopped) = watch::channel(false);
        let task = tokio::spawn(processor.run(stopped));
        Self {
            shutdown,
            task,
            handle,
        }
    }

    async fn wait_for(&self, condition: impl Fn(&PartitionState) -> bool) -> bool {
        eventually(WAIT, || condition(&self.handle.state())).await
    }

    async fn stop(self) -> Result<(), ProcessingError> {
        self.shutdown.send_replace(true);
        tokio::time::timeout(WAIT, self.task).await.unwrap().unwrap()
    }
}

fn create_job(job_type: &str, request_id: u64) -> Record {
    Record::command(ValueType::Job, Intent::Create, json!({ "job_type": job_type }))
        .with_request_id(request_id)
}

fn job_created_event(key: i64, position: i64, source_position: i64) -> Record {
    let mut event = Record::event(key, ValueType::Job, Intent::Created, json!({ "job_type": "a" }));
    event.position = position;
    event.source_position = source_position;
    event
}

#[tokio::test]
async fn leader_processes_command_and_writes_follow_up_event() {
    let fx = Fixture::leader();
    let running = fx.start_leader();
    let position = fx.write(create_job("payment", 11));

    assert!(running.wait_for(|s| s.last_processed_position == position).await);
    assert_eq!(running.handle.phase(), Phase::Processing);
    assert_eq!(running.handle.state().last_written_position, position + 1);
    running.stop().await.unwrap();

    let records = fx.records();
    assert_eq!(records.len(), 2);
    let event = &records[1];
    assert_eq!(event.intent, Intent::Created);
    assert_eq!(event.position, position + 1);
    assert_eq!(event.source_position, position);
    assert_eq!(event.timestamp, 1_000);

    let responses = fx.responses.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].request_id, 11);
    assert_eq!(responses[0].key, 1);
    assert_eq!(fx.notifier.delivered().len(), 1);
}

#[tokio::test]
async fn rejected_command_is_answered_without_side_effects() {
    let fx = Fixture::leader();
    let running = fx.start_leader();
    let complete = Record::command(ValueType::Job, Intent::Complete, json!({}))
        .with_key(99)
        .with_request_id(3);
    let position = fx.write(complete);

    assert!(running.wait_for(|s| s.last_processed_position == position).await);
    running.stop().await.unwrap();

    let responses = fx.responses.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].rejection.as_ref().unwrap().kind,
        keel_core::RejectionType::NotFound
    );
    assert!(fx.notifier.calls().is_empty());
    assert_eq!(fx.records()[1].record_type, RecordType::CommandRejection);
}

#[tokio::test]
async fn replay_rebuilds_processed_state() {
    let fx = Fixture::leader();
    let leader = fx.start_leader();
    fx.write(create_job("a", 1));
    fx.write(Record::command(
        ValueType::Variable,
        Intent::Update,
        json!({ "name": "limit", "value": 3 }),
    ));
    let last = fx.write(create_job("b", 2));
    assert!(leader.wait_for(|s| s.last_processed_position == last).await);
    let processed = leader.handle.state();
    leader.stop().await.unwrap();

    let follower = fx.start_follower();
    let written = fx.records().last().unwrap().position;
    assert!(follower.wait_for(|s| s.last_position == written).await);
    let replayed = follower.handle.state();
    assert_eq!(follower.handle.phase(), Phase::Replaying);
    follower.stop().await.unwrap();

    assert_eq!(replayed.jobs, processed.jobs);
    assert_eq!(replayed.variables, processed.variables);
    assert_eq!(replayed.next_key, processed.next_key);
    assert_eq!(replayed.last_processed_position, last);
}

#[tokio::test]
async fn restarted_leader_does_not_reprocess_commands() {
    let fx = Fixture::leader();
    let first = fx.start_leader();
    let position = fx.write(create_job("a", 1));
    assert!(first.wait_for(|s| s.last_processed_position == position).await);
    first.stop().await.unwrap();
    let written = fx.records().len();

    let second = fx.start_leader();
    let phase = second.handle.subscribe();
    assert!(eventually(WAIT, || *phase.borrow() == Phase::Processing).await);
    let next = fx.write(create_job("b", 2));
    assert!(second.wait_for(|s| s.last_processed_position == next).await);
    second.stop().await.unwrap();

    // One command and one event more than before the restart
    assert_eq!(fx.records().len(), written + 2);
    assert_eq!(fx.notifier.delivered().len(), 2);
    assert_eq!(fx.responses.responses().len(), 2);
}

#[tokio::test]
async fn at_least_once_side_effect_is_retried_until_delivered() {
    let fx = Fixture::leader();
    fx.notifier.fail_next(2);
    let running = fx.start_leader();
    fx.write(create_job("a", 1));

    assert!(eventually(WAIT, || fx.notifier.delivered().len() == 1).await);
    running.stop().await.unwrap();

    assert_eq!(fx.notifier.calls().len(), 3);
}

#[tokio::test]
async fn at_most_once_side_effect_is_not_retried() {
    let fx = Fixture::leader();
    let running = fx.start_leader();
    fx.write(create_job("a", 1));
    assert!(eventually(WAIT, || fx.notifier.delivered().len() == 1).await);

    fx.notifier.fail_next(1);
    let complete = Record::command(ValueType::Job, Intent::Complete, json!({})).with_key(1);
    let completed = fx.write(complete);
    assert!(running.wait_for(|s| s.last_processed_position == completed).await);
    running.stop().await.unwrap();

    let calls = fx.notifier.calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls[1].delivered);
}

#[tokio::test]
async fn paused_processor_reads_nothing_until_resumed() {
    let fx = Fixture::leader();
    let running = fx.start_leader();
    let phase = running.handle.subscribe();
    assert!(eventually(WAIT, || *phase.borrow() == Phase::Processing).await);

    running.handle.pause();
    assert!(eventually(WAIT, || *phase.borrow() == Phase::Paused).await);
    let position = fx.write(create_job("a", 1));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(running.handle.state().jobs.is_empty());

    running.handle.resume();
    assert!(running.wait_for(|s| s.last_processed_position == position).await);
    assert_eq!(running.handle.phase(), Phase::Processing);
    running.stop().await.unwrap();
}

#[tokio::test]
async fn follower_waits_for_snapshot_covering_gap() {
    let fx = Fixture::follower();
    fx.append_committed(&job_created_event(7, 5, 4));
    let running = fx.start_follower();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(running.handle.state(), PartitionState::default());

    let mut covered = PartitionState {
        next_key: 3,
        last_position: 4,
        last_processed_position: 3,
        ..PartitionState::default()
    };
    covered.jobs.insert(
        2,
        JobValue {
            job_type: "earlier".to_string(),
            worker: None,
            deadline: 0,
        },
    );
    commit_snapshot(&fx.snapshots, STATE_SNAPSHOT, 4, &covered.to_bytes().unwrap());

    assert!(running.wait_for(|s| s.last_position == 5).await);
    let state = running.handle.state();
    running.stop().await.unwrap();

    assert_eq!(state.jobs.keys().copied().collect::<Vec<_>>(), vec![2, 7]);
    assert_eq!(state.next_key, 8);
    assert_eq!(state.last_processed_position, 4);
}

#[tokio::test]
async fn processor_recovers_from_latest_snapshot() {
    let fx = Fixture::follower();
    let mut snapshotted = PartitionState {
        last_position: 1,
        ..PartitionState::default()
    };
    snapshotted.observe_key(1);
    commit_snapshot(&fx.snapshots, STATE_SNAPSHOT, 1, &snapshotted.to_bytes().unwrap());
    fx.append_committed(&job_created_event(4, 2, 1));

    let running = fx.start_follower();
    assert!(running.wait_for(|s| s.last_position == 2).await);
    let state = running.handle.state();
    running.stop().await.unwrap();

    assert!(state.jobs.contains_key(&4));
    assert_eq!(state.next_key, 5);
}

#[tokio::test]
async fn leader_fails_on_gap() {
    let fx = Fixture::leader();
    let mut record = create_job("a", 1);
    record.position = 3;
    fx.raft.append(3, record.to_bytes().unwrap()).unwrap();

    let running = fx.start_leader();
    let phase = running.handle.subscribe();
    assert!(eventually(WAIT, || *phase.borrow() == Phase::Failed).await);

    let err = running.stop().await.unwrap_err();
    assert!(matches!(
        err,
        ProcessingError::Gap {
            last_position: 0,
            position: 3
        }
    ));
}

#[tokio::test]
async fn writer_refuses_when_not_leader() {
    let fx = Fixture::follower();
    let err = fx.writer().write(vec![create_job("a", 1)]).unwrap_err();
    assert!(err.is_not_leader());
}
