// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary wire protocol between brokers
//!
//! Frame: `u32` big-endian body length, then the body. The body starts with
//! a template byte and a version byte; the rest is template specific.
//! Integers are big-endian, strings and byte arrays are `u32` length
//! prefixed, optional log indices are `i64` with `-1` meaning none.

use keel_core::{NodeId, PartitionId};
use keel_storage::{LogEntry, SnapshotMetadata};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Wire format version carried in every message
pub const PROTOCOL_VERSION: u8 = 1;

/// Default timeout for reading or writing one message
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest body accepted from a peer
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

const LIST_SNAPSHOTS: u8 = 1;
const FETCH_SNAPSHOT_CHUNK: u8 = 2;
const REQUEST_VOTE: u8 = 3;
const APPEND_ENTRIES: u8 = 4;
const LIST_SNAPSHOTS_RESPONSE: u8 = 0x81;
const FETCH_SNAPSHOT_CHUNK_RESPONSE: u8 = 0x82;
const REQUEST_VOTE_RESPONSE: u8 = 0x83;
const APPEND_ENTRIES_RESPONSE: u8 = 0x84;
const ERROR_RESPONSE: u8 = 0xFF;

/// Errors from encoding, decoding or moving messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out")]
    Timeout,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("unknown message template {0:#x}")]
    UnknownTemplate(u8),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("message truncated while reading {0}")]
    Truncated(&'static str),
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(u32),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Request sent to another broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ListSnapshots(ListSnapshotsRequest),
    FetchSnapshotChunk(FetchSnapshotChunkRequest),
    RequestVote(VoteRequest),
    AppendEntries(AppendRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSnapshotsRequest {
    pub partition: PartitionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSnapshotChunkRequest {
    pub partition: PartitionId,
    pub name: String,
    pub log_position: i64,
    pub chunk_offset: u64,
    pub chunk_length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRequest {
    pub partition: PartitionId,
    pub term: u64,
    pub candidate: NodeId,
    pub last_log_index: Option<u64>,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendRequest {
    pub partition: PartitionId,
    pub term: u64,
    pub leader: NodeId,
    pub prev_log_index: Option<u64>,
    /// Term of the previous entry, `0` when the leader compacted it away
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: Option<u64>,
}

/// Response from another broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    ListSnapshots(Vec<SnapshotMetadata>),
    FetchSnapshotChunk(Vec<u8>),
    RequestVote(VoteResponse),
    AppendEntries(AppendResponse),
    Error(ErrorResponse),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteResponse {
    pub term: u64,
    pub granted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResponse {
    pub term: u64,
    pub success: bool,
    /// Index the follower wants next
    pub next_index: u64,
}

/// Error envelope returned instead of a regular response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    PartitionNotFound,
    SnapshotNotFound,
    NotLeader,
    InvalidRequest,
    Internal,
}

impl ErrorCode {
    fn to_byte(self) -> u8 {
        match self {
            ErrorCode::PartitionNotFound => 1,
            ErrorCode::SnapshotNotFound => 2,
            ErrorCode::NotLeader => 3,
            ErrorCode::InvalidRequest => 4,
            ErrorCode::Internal => 5,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        Ok(match byte {
            1 => ErrorCode::PartitionNotFound,
            2 => ErrorCode::SnapshotNotFound,
            3 => ErrorCode::NotLeader,
            4 => ErrorCode::InvalidRequest,
            5 => ErrorCode::Internal,
            other => {
                return Err(ProtocolError::Invalid {
                    field: "error code",
                    reason: other.to_string(),
                })
            }
        })
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::PartitionNotFound => "PARTITION_NOT_FOUND",
            ErrorCode::SnapshotNotFound => "SNAPSHOT_NOT_FOUND",
            ErrorCode::NotLeader => "NOT_LEADER",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Internal => "INTERNAL",
        };
        f.write_str(name)
    }
}

impl Request {
    /// Partition the request is addressed to
    pub fn partition(&self) -> PartitionId {
        match self {
            Request::ListSnapshots(r) => r.partition,
            Request::FetchSnapshotChunk(r) => r.partition,
            Request::RequestVote(r) => r.partition,
            Request::AppendEntries(r) => r.partition,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Request::ListSnapshots(_) => "list_snapshots",
            Request::FetchSnapshotChunk(_) => "fetch_snapshot_chunk",
            Request::RequestVote(_) => "request_vote",
            Request::AppendEntries(_) => "append_entries",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Encoder::new();
        match self {
            Request::ListSnapshots(r) => {
                out.header(LIST_SNAPSHOTS);
                out.u32(r.partition.0);
            }
            Request::FetchSnapshotChunk(r) => {
                out.header(FETCH_SNAPSHOT_CHUNK);
                out.u32(r.partition.0);
                out.string(&r.name);
                out.i64(r.log_position);
                out.u64(r.chunk_offset);
                out.u32(r.chunk_length);
            }
            Request::RequestVote(r) => {
                out.header(REQUEST_VOTE);
                out.u32(r.partition.0);
                out.u64(r.term);
                out.u32(r.candidate.0);
                out.opt_index(r.last_log_index);
                out.u64(r.last_log_term);
            }
            Request::AppendEntries(r) => {
                out.header(APPEND_ENTRIES);
                out.u32(r.partition.0);
                out.u64(r.term);
                out.u32(r.leader.0);
                out.opt_index(r.prev_log_index);
                out.u64(r.prev_log_term);
                out.opt_index(r.leader_commit);
                out.u32(r.entries.len() as u32);
                for entry in &r.entries {
                    out.u64(entry.index);
                    out.i64(entry.asqn);
                    out.bytes(&entry.payload);
                }
            }
        }
        out.finish()
    }

    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut input = Decoder::new(body);
        let request = match input.header()? {
            LIST_SNAPSHOTS => Request::ListSnapshots(ListSnapshotsRequest {
                partition: PartitionId(input.u32("partition")?),
            }),
            FETCH_SNAPSHOT_CHUNK => Request::FetchSnapshotChunk(FetchSnapshotChunkRequest {
                partition: PartitionId(input.u32("partition")?),
                name: input.string("name")?,
                log_position: input.i64("log position")?,
                chunk_offset: input.u64("chunk offset")?,
                chunk_length: input.u32("chunk length")?,
            }),
            REQUEST_VOTE => Request::RequestVote(VoteRequest {
                partition: PartitionId(input.u32("partition")?),
                term: input.u64("term")?,
                candidate: NodeId(input.u32("candidate")?),
                last_log_index: input.opt_index("last log index")?,
                last_log_term: input.u64("last log term")?,
            }),
            APPEND_ENTRIES => {
                let partition = PartitionId(input.u32("partition")?);
                let term = input.u64("term")?;
                let leader = NodeId(input.u32("leader")?);
                let prev_log_index = input.opt_index("prev log index")?;
                let prev_log_term = input.u64("prev log term")?;
                let leader_commit = input.opt_index("leader commit")?;
                let count = input.u32("entry count")?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    entries.push(LogEntry::new(
                        input.u64("entry index")?,
                        input.i64("entry asqn")?,
                        input.bytes("entry payload")?,
                    ));
                }
                Request::AppendEntries(AppendRequest {
                    partition,
                    term,
                    leader,
                    prev_log_index,
                    prev_log_term,
                    entries,
                    leader_commit,
                })
            }
            other => return Err(ProtocolError::UnknownTemplate(other)),
        };
        input.finish()?;
        Ok(request)
    }
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Response::ListSnapshots(_) => "list_snapshots",
            Response::FetchSnapshotChunk(_) => "fetch_snapshot_chunk",
            Response::RequestVote(_) => "request_vote",
            Response::AppendEntries(_) => "append_entries",
            Response::Error(_) => "error",
        }
    }

    /// Turn an error envelope into `Err`
    pub fn into_result(self) -> Result<Response, ErrorResponse> {
        match self {
            Response::Error(e) => Err(e),
            other => Ok(other),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Encoder::new();
        match self {
            Response::ListSnapshots(snapshots) => {
                out.header(LIST_SNAPSHOTS_RESPONSE);
                out.u32(snapshots.len() as u32);
                for s in snapshots {
                    out.string(&s.name);
                    out.i64(s.log_position);
                    out.u64(s.length);
                    out.u64(s.checksum);
                }
            }
            Response::FetchSnapshotChunk(data) => {
                out.header(FETCH_SNAPSHOT_CHUNK_RESPONSE);
                out.bytes(data);
            }
            Response::RequestVote(r) => {
                out.header(REQUEST_VOTE_RESPONSE);
                out.u64(r.term);
                out.bool(r.granted);
            }
            Response::AppendEntries(r) => {
                out.header(APPEND_ENTRIES_RESPONSE);
                out.u64(r.term);
                out.bool(r.success);
                out.u64(r.next_index);
            }
            Response::Error(e) => {
                out.header(ERROR_RESPONSE);
                out.u8(e.code.to_byte());
                out.string(&e.message);
            }
        }
        out.finish()
    }

    pub fn decode(body: &[u8]) -> Result<Self, ProtocolError> {
        let mut input = Decoder::new(body);
        let response = match input.header()? {
            LIST_SNAPSHOTS_RESPONSE => {
                let count = input.u32("snapshot count")?;
                let mut snapshots = Vec::new();
                for _ in 0..count {
                    snapshots.push(SnapshotMetadata {
                        name: input.string("snapshot name")?,
                        log_position: input.i64("snapshot log position")?,
                        length: input.u64("snapshot length")?,
                        checksum: input.u64("snapshot checksum")?,
                    });
                }
                Response::ListSnapshots(snapshots)
            }
            FETCH_SNAPSHOT_CHUNK_RESPONSE => Response::FetchSnapshotChunk(input.bytes("chunk")?),
            REQUEST_VOTE_RESPONSE => Response::RequestVote(VoteResponse {
                term: input.u64("term")?,
                granted: input.bool("granted")?,
            }),
            APPEND_ENTRIES_RESPONSE => Response::AppendEntries(AppendResponse {
                term: input.u64("term")?,
                success: input.bool("success")?,
                next_index: input.u64("next index")?,
            }),
            ERROR_RESPONSE => Response::Error(ErrorResponse {
                code: ErrorCode::from_byte(input.u8("error code")?)?,
                message: input.string("error message")?,
            }),
            other => return Err(ProtocolError::UnknownTemplate(other)),
        };
        input.finish()?;
        Ok(response)
    }
}

struct Encoder(Vec<u8>);

impl Encoder {
    fn new() -> Self {
        Self(Vec::with_capacity(64))
    }

    fn header(&mut self, template: u8) {
        self.0.push(template);
        self.0.push(PROTOCOL_VERSION);
    }

    fn u8(&mut self, v: u8) {
        self.0.push(v);
    }

    fn bool(&mut self, v: bool) {
        self.0.push(u8::from(v));
    }

    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.0.extend_from_slice(&v.to_be_bytes());
    }

    fn opt_index(&mut self, v: Option<u64>) {
        self.i64(v.map(|i| i as i64).unwrap_or(-1));
    }

    fn bytes(&mut self, v: &[u8]) {
        self.u32(v.len() as u32);
        self.0.extend_from_slice(v);
    }

    fn string(&mut self, v: &str) {
        self.bytes(v.as_bytes());
    }

    fn finish(self) -> Vec<u8> {
        self.0
    }
}

struct Decoder<'a> {
    buf: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], ProtocolError> {
        if self.buf.len() < n {
            return Err(ProtocolError::Truncated(field));
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn header(&mut self) -> Result<u8, ProtocolError> {
        let template = self.u8("template")?;
        let version = self.u8("version")?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        Ok(template)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, ProtocolError> {
        Ok(self.array::<1>(field)?[0])
    }

    fn bool(&mut self, field: &'static str) -> Result<bool, ProtocolError> {
        match self.u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::Invalid {
                field,
                reason: format!("{} is not a boolean", other),
            }),
        }
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        Ok(u32::from_be_bytes(self.array(field)?))
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, ProtocolError> {
        Ok(u64::from_be_bytes(self.array(field)?))
    }

    fn i64(&mut self, field: &'static str) -> Result<i64, ProtocolError> {
        Ok(i64::from_be_bytes(self.array(field)?))
    }

    fn opt_index(&mut self, field: &'static str) -> Result<Option<u64>, ProtocolError> {
        match self.i64(field)? {
            -1 => Ok(None),
            v if v >= 0 => Ok(Some(v as u64)),
            v => Err(ProtocolError::Invalid {
                field,
                reason: format!("negative index {}", v),
            }),
        }
    }

    fn bytes(&mut self, field: &'static str) -> Result<Vec<u8>, ProtocolError> {
        let len = self.u32(field)? as usize;
        Ok(self.take(len, field)?.to_vec())
    }

    fn string(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        String::from_utf8(self.bytes(field)?).map_err(|e| ProtocolError::Invalid {
            field,
            reason: e.to_string(),
        })
    }

    fn finish(self) -> Result<(), ProtocolError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::TrailingBytes(self.buf.len()))
        }
    }
}

/// Read one length-prefixed frame
pub async fn read_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len);
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write one length-prefixed frame
pub async fn write_message<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> Result<(), ProtocolError> {
    let len = u32::try_from(body.len()).map_err(|_| ProtocolError::FrameTooLarge(u32::MAX))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_request<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Request, ProtocolError> {
    let body = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    Request::decode(&body)
}

pub async fn write_request<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    request: &Request,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    tokio::time::timeout(timeout, write_message(writer, &request.encode()))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

pub async fn read_response<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Response, ProtocolError> {
    let body = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    Response::decode(&body)
}

pub async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    tokio::time::timeout(timeout, write_message(writer, &response.encode()))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
