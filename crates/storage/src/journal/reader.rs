// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Positioned reader over a journal

use super::{Journal, JournalError, LogEntry};

/// Sequential reader over a [`Journal`]
///
/// Readers see appends made after they were opened. A committed reader
/// never yields entries past the commit index.
pub struct JournalReader {
    journal: Journal,
    next: u64,
    committed_only: bool,
}

impl JournalReader {
    pub(crate) fn new(journal: Journal, committed_only: bool) -> Self {
        let next = journal.first_index();
        Self {
            journal,
            next,
            committed_only,
        }
    }

    /// Index of the entry the next call to `next()` returns
    pub fn position(&self) -> u64 {
        self.next
    }

    /// Position at `index`
    pub fn seek(&mut self, index: u64) {
        self.next = index;
    }

    pub fn seek_to_first(&mut self) {
        self.next = self.journal.first_index();
    }

    /// Position at the last entry
    pub fn seek_to_last(&mut self) {
        let inner = self.journal.lock();
        let last = if self.committed_only {
            inner.commit_index()
        } else {
            inner.last_index()
        };
        self.next = last.unwrap_or_else(|| inner.next_index());
    }

    /// Position at the entry carrying `asqn`
    ///
    /// Returns true on an exact match. Otherwise the reader is left at the
    /// closest entry before `asqn` (or at the first entry) and false is
    /// returned.
    pub fn seek_to_asqn(&mut self, asqn: i64) -> bool {
        let inner = self.journal.lock();
        let (index, exact) = inner.locate_asqn(asqn);
        self.next = index.unwrap_or_else(|| inner.first_index());
        exact
    }

    /// Whether `next()` would return an entry
    pub fn has_next(&self) -> bool {
        let inner = self.journal.lock();
        let next = self.next.max(inner.first_index());
        match self.limit(&inner) {
            Some(limit) => next <= limit,
            None => false,
        }
    }

    fn limit(&self, inner: &super::JournalInner) -> Option<u64> {
        if self.committed_only {
            match (inner.commit_index(), inner.last_index()) {
                (Some(commit), Some(last)) => Some(commit.min(last)),
                _ => None,
            }
        } else {
            inner.last_index()
        }
    }
}

impl Iterator for JournalReader {
    type Item = Result<LogEntry, JournalError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut inner = self.journal.lock();
        // Entries below the first index were compacted away
        let next = self.next.max(inner.first_index());
        let limit = self.limit(&inner)?;
        if next > limit {
            return None;
        }
        match inner.read(next) {
            Ok(Some(entry)) => {
                self.next = next + 1;
                Some(Ok(entry))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
