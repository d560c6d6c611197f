// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Journal entry and its on-disk frame
//!
//! ```text
//! | len: u32 | crc32: u32 | index: u64 | asqn: i64 | payload ... |
//!            \_________ crc covers ___________________________/
//! ```
//!
//! `len` counts the bytes after the crc. All integers are big-endian.

use serde::{Deserialize, Serialize};

/// Application sequence number for entries that carry none
///
/// Such entries are exempt from ordering checks and never match an asqn seek.
pub const ASQN_IGNORE: i64 = -1;

/// Bytes before the checksummed body
pub(crate) const FRAME_PREFIX_LEN: usize = 8;
/// Fixed part of the checksummed body
pub(crate) const FRAME_FIXED_LEN: usize = 16;

/// A single entry in the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the journal, gapless and increasing by one
    pub index: u64,
    /// Application sequence number (record position)
    pub asqn: i64,
    pub payload: Vec<u8>,
}

impl LogEntry {
    pub fn new(index: u64, asqn: i64, payload: Vec<u8>) -> Self {
        Self {
            index,
            asqn,
            payload,
        }
    }

    /// Whether this entry takes part in asqn ordering
    pub fn has_asqn(&self) -> bool {
        self.asqn != ASQN_IGNORE
    }

    /// Encode the entry as a complete frame
    pub(crate) fn encode_frame(&self) -> Vec<u8> {
        let body_len = FRAME_FIXED_LEN + self.payload.len();
        let mut body = Vec::with_capacity(body_len);
        body.extend_from_slice(&self.index.to_be_bytes());
        body.extend_from_slice(&self.asqn.to_be_bytes());
        body.extend_from_slice(&self.payload);

        let mut frame = Vec::with_capacity(FRAME_PREFIX_LEN + body_len);
        frame.extend_from_slice(&(body_len as u32).to_be_bytes());
        frame.extend_from_slice(&crc32fast::hash(&body).to_be_bytes());
        frame.extend_from_slice(&body);
        frame
    }

    /// Decode a checksummed body, verifying it against the stored crc
    pub(crate) fn decode_body(body: &[u8], expected_crc: u32) -> Result<Self, FrameError> {
        if body.len() < FRAME_FIXED_LEN {
            return Err(FrameError::TooShort(body.len()));
        }
        let actual_crc = crc32fast::hash(body);
        if actual_crc != expected_crc {
            return Err(FrameError::ChecksumMismatch {
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        let mut index = [0u8; 8];
        index.copy_from_slice(&body[0..8]);
        let mut asqn = [0u8; 8];
        asqn.copy_from_slice(&body[8..16]);

        Ok(Self {
            index: u64::from_be_bytes(index),
            asqn: i64::from_be_bytes(asqn),
            payload: body[FRAME_FIXED_LEN..].to_vec(),
        })
    }
}

/// Split a frame prefix into (body length, crc)
pub(crate) fn decode_prefix(prefix: &[u8; FRAME_PREFIX_LEN]) -> (usize, u32) {
    let mut len = [0u8; 4];
    len.copy_from_slice(&prefix[0..4]);
    let mut crc = [0u8; 4];
    crc.copy_from_slice(&prefix[4..8]);
    (u32::from_be_bytes(len) as usize, u32::from_be_bytes(crc))
}

/// Reasons a frame cannot be decoded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame body too short: {0} bytes")]
    TooShort(usize),
    #[error("checksum mismatch: expected {expected:#x}, actual {actual:#x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
