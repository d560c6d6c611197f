// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consensus envelope around journal payloads
//!
//! Layout: `term:u64 | kind:u8 | data`.

use super::RaftError;

const KIND_NO_OP: u8 = 0;
const KIND_APPLICATION: u8 = 1;
const HEADER_LEN: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Written by a new leader to commit entries of earlier terms
    NoOp,
    /// Application data, a serialized record
    Application(Vec<u8>),
}

/// Payload of every journal entry written through consensus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftEntry {
    pub term: u64,
    pub kind: EntryKind,
}

impl RaftEntry {
    pub fn no_op(term: u64) -> Self {
        Self {
            term,
            kind: EntryKind::NoOp,
        }
    }

    pub fn application(term: u64, data: Vec<u8>) -> Self {
        Self {
            term,
            kind: EntryKind::Application(data),
        }
    }

    /// Application data, `None` for bookkeeping entries
    pub fn data(&self) -> Option<&[u8]> {
        match &self.kind {
            EntryKind::NoOp => None,
            EntryKind::Application(data) => Some(data),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let data = self.data().unwrap_or_default();
        let mut buf = Vec::with_capacity(HEADER_LEN + data.len());
        buf.extend_from_slice(&self.term.to_be_bytes());
        match &self.kind {
            EntryKind::NoOp => buf.push(KIND_NO_OP),
            EntryKind::Application(data) => {
                buf.push(KIND_APPLICATION);
                buf.extend_from_slice(data);
            }
        }
        buf
    }

    /// Decode the payload of the journal entry at `index`
    pub fn decode(index: u64, bytes: &[u8]) -> Result<Self, RaftError> {
        let malformed = |reason: &str| RaftError::MalformedEntry {
            index,
            reason: reason.to_string(),
        };
        if bytes.len() < HEADER_LEN {
            return Err(malformed("truncated header"));
        }
        let (term, rest) = bytes.split_at(8);
        let mut term_bytes = [0u8; 8];
        term_bytes.copy_from_slice(term);
        let term = u64::from_be_bytes(term_bytes);
        let kind = match rest[0] {
            KIND_NO_OP if rest.len() == 1 => EntryKind::NoOp,
            KIND_NO_OP => return Err(malformed("no-op entry carries data")),
            KIND_APPLICATION => EntryKind::Application(rest[1..].to_vec()),
            _ => return Err(malformed("unknown entry kind")),
        };
        Ok(Self { term, kind })
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
