// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Segmented, checksummed append-only journal
//!
//! The journal is a gapless sequence of [`LogEntry`] values. Appends are
//! durable before they return. A commit index marks the prefix the state
//! machine may consume; it only ever moves forward.

mod entry;
mod reader;
mod segment;

pub use entry::{FrameError, LogEntry, ASQN_IGNORE};
pub use reader::JournalReader;

use keel_core::config::JournalConfig;
use segment::{parse_segment_id, Segment, SEGMENT_HEADER_LEN};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::watch;

/// Errors from journal operations
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("asqn {asqn} out of order, last asqn is {last_asqn}")]
    OutOfOrder { asqn: i64, last_asqn: i64 },
    #[error("entry index {actual} does not match next index {expected}")]
    IndexMismatch { expected: u64, actual: u64 },
    #[error("commit index cannot move back from {current} to {requested}")]
    CommitIndexRegression { current: u64, requested: u64 },
    #[error("commit index {requested} is beyond the last entry {last:?}")]
    CommitIndexBeyondLog { requested: u64, last: Option<u64> },
    #[error("cannot truncate after {index}, entries up to {commit_index} are committed")]
    TruncateCommitted { index: u64, commit_index: u64 },
    #[error("corrupted entry in {} at offset {offset}: {reason}", segment.display())]
    Corrupted {
        segment: PathBuf,
        offset: u64,
        reason: String,
    },
    #[error("invalid segment {}: {reason}", path.display())]
    InvalidSegment { path: PathBuf, reason: String },
    #[error("journal is poisoned by an earlier write failure")]
    Poisoned,
}

pub(crate) struct JournalInner {
    dir: PathBuf,
    max_segment_size: u64,
    /// Ordered by first index; never empty
    segments: Vec<Segment>,
    last_asqn: i64,
    commit_index: Option<u64>,
    poisoned: bool,
}

/// Handle to a partition's journal
///
/// Clones share the same underlying files.
#[derive(Clone)]
pub struct Journal {
    inner: Arc<Mutex<JournalInner>>,
    commits: Arc<watch::Sender<Option<u64>>>,
}

impl Journal {
    /// Open the journal in `dir`, recovering from a torn tail if needed
    pub fn open(dir: &Path, config: &JournalConfig) -> Result<Self, JournalError> {
        fs::create_dir_all(dir)?;

        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(id) = entry.file_name().to_str().and_then(parse_segment_id) {
                ids.push(id);
            }
        }
        ids.sort_unstable();

        let mut segments: Vec<Segment> = Vec::new();
        let mut ids = ids.into_iter().peekable();
        while let Some(id) = ids.next() {
            let path = dir.join(segment::segment_file_name(id));
            // A crash while rolling can leave the newest segment without a full header
            if ids.peek().is_none() && fs::metadata(&path)?.len() < SEGMENT_HEADER_LEN {
                tracing::warn!(segment = id, "removing journal segment with torn header");
                fs::remove_file(&path)?;
                break;
            }
            let recovered = Segment::recover(&path, id)?;
            if let Some(previous) = segments.last() {
                if recovered.segment.first_index() != previous.next_index() {
                    tracing::warn!(
                        segment = id,
                        expected = previous.next_index(),
                        actual = recovered.segment.first_index(),
                        "journal segment does not continue previous segment, dropping it and later segments"
                    );
                    recovered.segment.delete()?;
                    break;
                }
            }
            let torn = recovered.truncated_bytes > 0;
            if torn {
                tracing::warn!(
                    segment = id,
                    bytes = recovered.truncated_bytes,
                    "truncated torn journal tail"
                );
            }
            segments.push(recovered.segment);
            if torn {
                break;
            }
        }
        // Anything after a torn segment or a gap cannot be trusted
        for id in ids {
            let path = dir.join(segment::segment_file_name(id));
            tracing::warn!(segment = id, "removing journal segment after damaged tail");
            fs::remove_file(path)?;
        }

        if segments.is_empty() {
            segments.push(Segment::create(dir, 1, 0)?);
        }

        let last_asqn = last_asqn_of(&segments);
        let inner = JournalInner {
            dir: dir.to_path_buf(),
            max_segment_size: config.max_segment_size,
            segments,
            last_asqn,
            commit_index: None,
            poisoned: false,
        };
        tracing::debug!(
            dir = %dir.display(),
            first_index = inner.first_index(),
            next_index = inner.next_index(),
            "opened journal"
        );

        let (commits, _) = watch::channel(None);
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            commits: Arc::new(commits),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, JournalInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a payload, returning the index it was written at
    ///
    /// `asqn` must be [`ASQN_IGNORE`] or strictly greater than the last
    /// asqn in the journal.
    pub fn append(&self, asqn: i64, payload: Vec<u8>) -> Result<u64, JournalError> {
        let mut inner = self.lock();
        let index = inner.next_index();
        inner.append(LogEntry::new(index, asqn, payload))?;
        Ok(index)
    }

    /// Append an entry replicated from the leader; its index must be the next index
    pub fn append_entry(&self, entry: &LogEntry) -> Result<(), JournalError> {
        let mut inner = self.lock();
        let expected = inner.next_index();
        if entry.index != expected {
            return Err(JournalError::IndexMismatch {
                expected,
                actual: entry.index,
            });
        }
        inner.append(entry.clone())
    }

    /// Reader over every entry in the journal
    pub fn open_reader(&self) -> JournalReader {
        JournalReader::new(self.clone(), false)
    }

    /// Reader that stops at the commit index
    pub fn open_committed_reader(&self) -> JournalReader {
        JournalReader::new(self.clone(), true)
    }

    /// Remove every entry with an index greater than `index`
    pub fn delete_after(&self, index: u64) -> Result<(), JournalError> {
        let mut inner = self.lock();
        if let Some(commit_index) = inner.commit_index {
            if index < commit_index {
                return Err(JournalError::TruncateCommitted {
                    index,
                    commit_index,
                });
            }
        }
        inner.truncate_after(Some(index))
    }

    /// Drop every entry; the next append gets `next_index`
    ///
    /// Used when a follower installs state that covers everything before
    /// `next_index`. Entries below it count as committed.
    pub fn reset(&self, next_index: u64) -> Result<(), JournalError> {
        let mut inner = self.lock();
        let old = std::mem::take(&mut inner.segments);
        let next_id = old.last().map(|s| s.id() + 1).unwrap_or(1);
        for segment in old {
            segment.delete()?;
        }
        let segment = Segment::create(&inner.dir, next_id, next_index)?;
        inner.segments.push(segment);
        inner.last_asqn = ASQN_IGNORE;
        inner.poisoned = false;
        inner.commit_index = next_index.checked_sub(1);
        let commit_index = inner.commit_index;
        drop(inner);

        tracing::info!(next_index, "journal reset");
        self.commits.send_replace(commit_index);
        Ok(())
    }

    /// Delete whole segments whose entries all lie below `index`
    ///
    /// Returns the number of segments removed. The active segment is kept.
    pub fn compact(&self, index: u64) -> Result<usize, JournalError> {
        let mut inner = self.lock();
        let mut removed = 0;
        while inner.segments.len() > 1 && inner.segments[1].first_index() <= index {
            let segment = inner.segments.remove(0);
            tracing::debug!(segment = segment.id(), "compacting journal segment");
            segment.delete()?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Advance the commit index
    ///
    /// Setting the current value again is a no-op. Moving it back, or past
    /// the last entry, is rejected.
    pub fn set_commit_index(&self, index: u64) -> Result<(), JournalError> {
        let mut inner = self.lock();
        if let Some(current) = inner.commit_index {
            if index < current {
                return Err(JournalError::CommitIndexRegression {
                    current,
                    requested: index,
                });
            }
            if index == current {
                return Ok(());
            }
        }
        if index >= inner.next_index() {
            return Err(JournalError::CommitIndexBeyondLog {
                requested: index,
                last: inner.last_index(),
            });
        }
        inner.commit_index = Some(index);
        drop(inner);

        self.commits.send_replace(Some(index));
        Ok(())
    }

    pub fn commit_index(&self) -> Option<u64> {
        self.lock().commit_index
    }

    /// Watch the commit index
    pub fn subscribe_commits(&self) -> watch::Receiver<Option<u64>> {
        self.commits.subscribe()
    }

    /// Index of the first readable entry (or of the next append when empty)
    pub fn first_index(&self) -> u64 {
        self.lock().first_index()
    }

    /// Index of the last entry, `None` when the journal holds no entries
    pub fn last_index(&self) -> Option<u64> {
        self.lock().last_index()
    }

    pub fn next_index(&self) -> u64 {
        self.lock().next_index()
    }

    /// Last asqn written, or [`ASQN_IGNORE`] if none
    pub fn last_asqn(&self) -> i64 {
        self.lock().last_asqn
    }

    pub fn is_empty(&self) -> bool {
        self.lock().last_index().is_none()
    }

    /// Read a single entry
    pub fn entry(&self, index: u64) -> Result<Option<LogEntry>, JournalError> {
        self.lock().read(index)
    }

    pub fn first_entry(&self) -> Result<Option<LogEntry>, JournalError> {
        let mut inner = self.lock();
        let first = inner.first_index();
        inner.read(first)
    }

    pub fn last_entry(&self) -> Result<Option<LogEntry>, JournalError> {
        let mut inner = self.lock();
        match inner.last_index() {
            Some(last) => inner.read(last),
            None => Ok(None),
        }
    }

    /// Sync every segment to disk
    pub fn flush(&self) -> Result<(), JournalError> {
        let mut inner = self.lock();
        if inner.poisoned {
            return Err(JournalError::Poisoned);
        }
        let result = inner.segments.iter_mut().try_for_each(Segment::flush);
        if result.is_err() {
            inner.poisoned = true;
        }
        result
    }

    /// Directory holding the segment files
    pub fn dir(&self) -> PathBuf {
        self.lock().dir.clone()
    }
}

impl JournalInner {
    fn first_index(&self) -> u64 {
        self.segments
            .iter()
            .find(|s| !s.is_empty())
            .or(self.segments.last())
            .map(|s| s.first_index())
            .unwrap_or(0)
    }

    fn next_index(&self) -> u64 {
        self.segments.last().map(|s| s.next_index()).unwrap_or(0)
    }

    fn last_index(&self) -> Option<u64> {
        self.segments.iter().rev().find_map(|s| s.last_index())
    }

    pub(crate) fn commit_index(&self) -> Option<u64> {
        self.commit_index
    }

    fn append(&mut self, entry: LogEntry) -> Result<(), JournalError> {
        if self.poisoned {
            return Err(JournalError::Poisoned);
        }
        if entry.has_asqn() && self.last_asqn != ASQN_IGNORE && entry.asqn <= self.last_asqn {
            return Err(JournalError::OutOfOrder {
                asqn: entry.asqn,
                last_asqn: self.last_asqn,
            });
        }

        if let Err(e) = self.roll_if_full() {
            self.poisoned = true;
            return Err(e);
        }
        let Some(segment) = self.segments.last_mut() else {
            return Err(JournalError::Poisoned);
        };
        if let Err(e) = segment.append(&entry) {
            tracing::error!(index = entry.index, error = %e, "journal append failed");
            self.poisoned = true;
            return Err(e);
        }
        if entry.has_asqn() {
            self.last_asqn = entry.asqn;
        }
        Ok(())
    }

    fn roll_if_full(&mut self) -> Result<(), JournalError> {
        let Some(active) = self.segments.last() else {
            return Ok(());
        };
        if active.is_empty() || active.size() < self.max_segment_size {
            return Ok(());
        }
        let id = active.id() + 1;
        let first_index = active.next_index();
        let segment = Segment::create(&self.dir, id, first_index)?;
        tracing::debug!(segment = id, first_index, "rolled journal segment");
        self.segments.push(segment);
        Ok(())
    }

    pub(crate) fn read(&mut self, index: u64) -> Result<Option<LogEntry>, JournalError> {
        match self.segments.iter_mut().find(|s| s.contains(index)) {
            Some(segment) => segment.read(index).map(Some),
            None => Ok(None),
        }
    }

    fn truncate_after(&mut self, index: Option<u64>) -> Result<(), JournalError> {
        // Later segments that start past the cut go entirely, but one is always kept
        while self.segments.len() > 1 {
            let starts_after = match (self.segments.last(), index) {
                (Some(s), Some(i)) => s.first_index() > i,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !starts_after {
                break;
            }
            if let Some(segment) = self.segments.pop() {
                segment.delete()?;
            }
        }
        if let Some(segment) = self.segments.last_mut() {
            segment.truncate_after(index)?;
        }

        self.last_asqn = last_asqn_of(&self.segments);
        self.poisoned = false;
        Ok(())
    }

    /// Find the index of the entry with `asqn`, or the closest one before it
    pub(crate) fn locate_asqn(&self, asqn: i64) -> (Option<u64>, bool) {
        let mut closest = None;
        for segment in &self.segments {
            for (offset, candidate) in segment.asqns().iter().enumerate() {
                if *candidate == ASQN_IGNORE {
                    continue;
                }
                let index = segment.first_index() + offset as u64;
                if *candidate == asqn {
                    return (Some(index), true);
                }
                if *candidate > asqn {
                    return (closest, false);
                }
                closest = Some(index);
            }
        }
        (closest, false)
    }
}

fn last_asqn_of(segments: &[Segment]) -> i64 {
    segments
        .iter()
        .rev()
        .flat_map(|s| s.asqns().iter().rev())
        .copied()
        .find(|asqn| *asqn != ASQN_IGNORE)
        .unwrap_or(ASQN_IGNORE)
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
