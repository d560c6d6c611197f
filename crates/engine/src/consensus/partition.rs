// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronous Raft core for one partition
//!
//! Transport agnostic: callers feed it requests and responses and send what
//! it returns. Journal indices are 0-based; `None` means "before the first
//! entry". Terms start at 1, so a `prev_log_term` of 0 tells a follower that
//! the leader no longer has the previous entry (it was compacted).

use super::{RaftEntry, RaftError, RaftMeta, Role, RoleState};
use keel_adapters::protocol::{AppendRequest, AppendResponse, VoteRequest, VoteResponse};
use keel_core::{NodeId, PartitionId};
use keel_storage::{Journal, ASQN_IGNORE};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Upper bound on entries carried by one append request
const MAX_ENTRIES_PER_REQUEST: u64 = 64;

pub struct RaftPartition {
    partition: PartitionId,
    id: NodeId,
    peers: Vec<NodeId>,
    journal: Journal,
    meta_dir: PathBuf,
    term: u64,
    voted_for: Option<NodeId>,
    role: Role,
    leader: Option<NodeId>,
    votes: HashSet<NodeId>,
    next_index: HashMap<NodeId, u64>,
    match_index: HashMap<NodeId, Option<u64>>,
    leader_contact: bool,
}

impl RaftPartition {
    /// Create the core as a follower, loading term and vote from `meta_dir`
    pub fn new(
        partition: PartitionId,
        id: NodeId,
        members: &[NodeId],
        journal: Journal,
        meta_dir: PathBuf,
    ) -> Result<Self, RaftError> {
        let meta = RaftMeta::load(&meta_dir)?;
        let peers = members.iter().copied().filter(|m| *m != id).collect();
        Ok(Self {
            partition,
            id,
            peers,
            journal,
            meta_dir,
            term: meta.term,
            voted_for: meta.voted_for,
            role: Role::Follower,
            leader: None,
            votes: HashSet::new(),
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            leader_contact: false,
        })
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn node_id(&self) -> NodeId {
        self.id
    }

    pub fn peers(&self) -> &[NodeId] {
        &self.peers
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    pub fn leader(&self) -> Option<NodeId> {
        self.leader
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    pub fn state(&self) -> RoleState {
        RoleState {
            role: self.role,
            term: self.term,
            leader: self.leader,
        }
    }

    /// Whether a leader or a granted candidate was heard from since the last call
    pub fn take_leader_contact(&mut self) -> bool {
        std::mem::take(&mut self.leader_contact)
    }

    /// Term of the entry at `index`, 0 when it is not in the journal
    pub fn term_at(&self, index: u64) -> Result<u64, RaftError> {
        match self.journal.entry(index)? {
            Some(entry) => Ok(RaftEntry::decode(index, &entry.payload)?.term),
            None => Ok(0),
        }
    }

    fn last_log(&self) -> Result<(Option<u64>, u64), RaftError> {
        let last_index = self.journal.next_index().checked_sub(1);
        let last_term = match last_index {
            Some(index) => self.term_at(index)?,
            None => 0,
        };
        Ok((last_index, last_term))
    }

    fn quorum(&self) -> usize {
        (self.peers.len() + 1) / 2 + 1
    }

    fn persist(&self) -> Result<(), RaftError> {
        RaftMeta {
            term: self.term,
            voted_for: self.voted_for,
        }
        .store(&self.meta_dir)
    }

    fn step_down(&mut self, term: u64) -> Result<(), RaftError> {
        if self.role != Role::Follower {
            tracing::info!(
                partition = %self.partition,
                was = ?self.role,
                term,
                "stepping down to follower"
            );
        }
        self.term = term;
        self.voted_for = None;
        self.role = Role::Follower;
        self.leader = None;
        self.persist()
    }

    /// Become a candidate for the next term
    ///
    /// A node without peers wins immediately.
    pub fn start_election(&mut self) -> Result<VoteRequest, RaftError> {
        self.term += 1;
        self.voted_for = Some(self.id);
        self.persist()?;
        self.role = Role::Candidate;
        self.leader = None;
        self.votes.clear();
        self.votes.insert(self.id);
        tracing::info!(partition = %self.partition, term = self.term, "starting election");

        let (last_log_index, last_log_term) = self.last_log()?;
        let request = VoteRequest {
            partition: self.partition,
            term: self.term,
            candidate: self.id,
            last_log_index,
            last_log_term,
        };
        if self.votes.len() >= self.quorum() {
            self.become_leader()?;
        }
        Ok(request)
    }

    pub fn handle_vote_request(&mut self, req: &VoteRequest) -> Result<VoteResponse, RaftError> {
        if req.term < self.term {
            return Ok(VoteResponse {
                term: self.term,
                granted: false,
            });
        }
        if req.term > self.term {
            self.step_down(req.term)?;
        }

        let free = self.voted_for.is_none() || self.voted_for == Some(req.candidate);
        let (last_index, last_term) = self.last_log()?;
        let up_to_date = (req.last_log_term, req.last_log_index) >= (last_term, last_index);
        let granted = free && up_to_date;
        if granted {
            self.voted_for = Some(req.candidate);
            self.persist()?;
            self.leader_contact = true;
        }
        tracing::debug!(
            partition = %self.partition,
            candidate = %req.candidate,
            term = req.term,
            granted,
            "vote requested"
        );
        Ok(VoteResponse {
            term: self.term,
            granted,
        })
    }

    /// Count a vote; returns true when it made this node leader
    pub fn handle_vote_response(
        &mut self,
        from: NodeId,
        resp: &VoteResponse,
    ) -> Result<bool, RaftError> {
        if resp.term > self.term {
            self.step_down(resp.term)?;
            return Ok(false);
        }
        if self.role != Role::Candidate || resp.term != self.term || !resp.granted {
            return Ok(false);
        }
        self.votes.insert(from);
        if self.votes.len() >= self.quorum() {
            self.become_leader()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn become_leader(&mut self) -> Result<(), RaftError> {
        self.role = Role::Leader;
        self.leader = Some(self.id);
        let next = self.journal.next_index();
        self.next_index = self.peers.iter().map(|p| (*p, next)).collect();
        self.match_index = self.peers.iter().map(|p| (*p, None)).collect();
        tracing::info!(partition = %self.partition, term = self.term, "became leader");

        // Entries of earlier terms only commit through an entry of this term
        self.journal
            .append(ASQN_IGNORE, RaftEntry::no_op(self.term).encode())?;
        self.advance_commit()?;
        Ok(())
    }

    /// Append application data as leader, returning its journal index
    pub fn append(&mut self, asqn: i64, data: Vec<u8>) -> Result<u64, RaftError> {
        if self.role != Role::Leader {
            return Err(RaftError::NotLeader {
                leader: self.leader,
            });
        }
        let index = self
            .journal
            .append(asqn, RaftEntry::application(self.term, data).encode())?;
        self.advance_commit()?;
        Ok(index)
    }

    /// Build the next append request for `peer`
    pub fn append_request_for(&self, peer: NodeId) -> Result<AppendRequest, RaftError> {
        let first = self.journal.first_index();
        let next_index = self.journal.next_index();
        let next = self
            .next_index
            .get(&peer)
            .copied()
            .unwrap_or(next_index)
            .clamp(first, next_index);
        let prev_log_index = next.checked_sub(1);
        let prev_log_term = match prev_log_index {
            Some(prev) if prev >= first => self.term_at(prev)?,
            _ => 0,
        };

        let mut entries = Vec::new();
        let end = next_index.min(next + MAX_ENTRIES_PER_REQUEST);
        for index in next..end {
            match self.journal.entry(index)? {
                Some(entry) => entries.push(entry),
                None => break,
            }
        }

        Ok(AppendRequest {
            partition: self.partition,
            term: self.term,
            leader: self.id,
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit: self.journal.commit_index(),
        })
    }

    pub fn handle_append_request(
        &mut self,
        req: &AppendRequest,
    ) -> Result<AppendResponse, RaftError> {
        if req.term < self.term {
            return Ok(self.append_response(false, self.journal.next_index()));
        }
        if req.term > self.term {
            self.step_down(req.term)?;
        }
        if self.role != Role::Follower || self.leader != Some(req.leader) {
            tracing::info!(partition = %self.partition, leader = %req.leader, term = req.term, "following leader");
        }
        self.role = Role::Follower;
        self.leader = Some(req.leader);
        self.leader_contact = true;

        if let Some(prev) = req.prev_log_index {
            if req.prev_log_term == 0 {
                // The leader compacted past `prev`; everything up to it is committed
                let covered = self.journal.commit_index().is_some_and(|c| c >= prev);
                if !covered {
                    tracing::info!(
                        partition = %self.partition,
                        next_index = prev + 1,
                        "leader compacted past our log, resetting journal"
                    );
                    self.journal.reset(prev + 1)?;
                }
            } else if prev >= self.journal.next_index() {
                return Ok(self.append_response(false, self.journal.next_index()));
            } else if prev >= self.journal.first_index() && self.term_at(prev)? != req.prev_log_term
            {
                return Ok(self.append_response(false, prev));
            }
        }

        for entry in &req.entries {
            if entry.index < self.journal.first_index() {
                continue;
            }
            if entry.index < self.journal.next_index() {
                let incoming = RaftEntry::decode(entry.index, &entry.payload)?.term;
                if self.term_at(entry.index)? == incoming {
                    continue;
                }
                tracing::info!(
                    partition = %self.partition,
                    index = entry.index,
                    "discarding conflicting entries"
                );
                match entry.index.checked_sub(1) {
                    Some(keep) => self.journal.delete_after(keep)?,
                    None => self.journal.reset(0)?,
                }
            }
            self.journal.append_entry(entry)?;
        }

        let last_verified = req
            .entries
            .last()
            .map(|e| e.index)
            .or(req.prev_log_index);
        if let (Some(leader_commit), Some(last)) = (req.leader_commit, last_verified) {
            let target = leader_commit.min(last);
            if self.journal.commit_index().map_or(true, |c| target > c) {
                self.journal.set_commit_index(target)?;
            }
        }

        Ok(self.append_response(true, last_verified.map_or(0, |i| i + 1)))
    }

    fn append_response(&self, success: bool, next_index: u64) -> AppendResponse {
        AppendResponse {
            term: self.term,
            success,
            next_index,
        }
    }

    pub fn handle_append_response(
        &mut self,
        from: NodeId,
        resp: &AppendResponse,
    ) -> Result<(), RaftError> {
        if resp.term > self.term {
            self.step_down(resp.term)?;
            return Ok(());
        }
        if self.role != Role::Leader || resp.term != self.term {
            return Ok(());
        }

        if resp.success {
            let matched = resp.next_index.checked_sub(1);
            let current = self.match_index.get(&from).copied().flatten();
            if matched > current {
                self.match_index.insert(from, matched);
            }
            self.next_index.insert(from, resp.next_index);
            self.advance_commit()?;
        } else {
            let current = self
                .next_index
                .get(&from)
                .copied()
                .unwrap_or_else(|| self.journal.next_index());
            let next = resp.next_index.min(current.saturating_sub(1));
            tracing::debug!(partition = %self.partition, peer = %from, next, "peer log diverges");
            self.next_index.insert(from, next);
        }
        Ok(())
    }

    /// Commit the highest index stored on a majority, if written in this term
    fn advance_commit(&mut self) -> Result<(), RaftError> {
        let Some(own_last) = self.journal.last_index() else {
            return Ok(());
        };
        let mut matched: Vec<Option<u64>> = self.match_index.values().copied().collect();
        matched.push(Some(own_last));
        matched.sort_unstable_by(|a, b| b.cmp(a));
        let Some(candidate) = matched.get(self.quorum() - 1).copied().flatten() else {
            return Ok(());
        };
        if self.journal.commit_index().is_some_and(|c| candidate <= c) {
            return Ok(());
        }
        if self.term_at(candidate)? != self.term {
            return Ok(());
        }
        self.journal.set_commit_index(candidate)?;
        tracing::debug!(partition = %self.partition, commit_index = candidate, "committed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "partition_tests.rs"]
mod tests;
