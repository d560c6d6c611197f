// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One journal segment file
//!
//! A segment starts with a header (`KJNL`, version, first index) followed by
//! frames. The offset and asqn of every frame are kept in memory so reads and
//! truncation never scan the file.

use super::entry::{decode_prefix, LogEntry, FRAME_PREFIX_LEN};
use super::JournalError;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const SEGMENT_MAGIC: &[u8; 4] = b"KJNL";
const SEGMENT_VERSION: u8 = 1;
pub(crate) const SEGMENT_HEADER_LEN: u64 = 13;

/// Build the file name of a segment
pub(crate) fn segment_file_name(id: u64) -> String {
    format!("journal-{}.log", id)
}

/// Parse a segment id out of a file name
pub(crate) fn parse_segment_id(name: &str) -> Option<u64> {
    name.strip_prefix("journal-")?
        .strip_suffix(".log")?
        .parse()
        .ok()
}

pub(crate) struct Segment {
    id: u64,
    path: PathBuf,
    file: File,
    first_index: u64,
    offsets: Vec<u64>,
    asqns: Vec<i64>,
    size: u64,
}

/// Outcome of scanning a segment on open
pub(crate) struct Recovered {
    pub segment: Segment,
    /// Bytes cut from the tail because of a torn or corrupt frame
    pub truncated_bytes: u64,
}

impl Segment {
    /// Create an empty segment whose first entry will have `first_index`
    pub fn create(dir: &Path, id: u64, first_index: u64) -> Result<Self, JournalError> {
        let path = dir.join(segment_file_name(id));
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let mut header = Vec::with_capacity(SEGMENT_HEADER_LEN as usize);
        header.extend_from_slice(SEGMENT_MAGIC);
        header.push(SEGMENT_VERSION);
        header.extend_from_slice(&first_index.to_be_bytes());
        file.write_all(&header)?;
        file.sync_all()?;

        Ok(Self {
            id,
            path,
            file,
            first_index,
            offsets: Vec::new(),
            asqns: Vec::new(),
            size: SEGMENT_HEADER_LEN,
        })
    }

    /// Open an existing segment, dropping any torn or corrupt tail
    pub fn recover(path: &Path, id: u64) -> Result<Recovered, JournalError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();

        let mut header = [0u8; SEGMENT_HEADER_LEN as usize];
        file.read_exact(&mut header)
            .map_err(|e| invalid_segment(path, format!("unreadable header: {}", e)))?;
        if &header[0..4] != SEGMENT_MAGIC {
            return Err(invalid_segment(path, "bad magic".to_string()));
        }
        if header[4] != SEGMENT_VERSION {
            return Err(invalid_segment(
                path,
                format!("unsupported version {}", header[4]),
            ));
        }
        let mut first = [0u8; 8];
        first.copy_from_slice(&header[5..13]);
        let first_index = u64::from_be_bytes(first);

        let mut reader = BufReader::new(&file);
        reader.seek(SeekFrom::Start(SEGMENT_HEADER_LEN))?;

        let mut offsets = Vec::new();
        let mut asqns = Vec::new();
        let mut offset = SEGMENT_HEADER_LEN;

        loop {
            let mut prefix = [0u8; FRAME_PREFIX_LEN];
            match reader.read_exact(&mut prefix) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let (len, crc) = decode_prefix(&prefix);
            if offset + (FRAME_PREFIX_LEN + len) as u64 > file_len {
                break; // torn write
            }
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body)?;

            let expected_index = first_index + offsets.len() as u64;
            match LogEntry::decode_body(&body, crc) {
                Ok(entry) if entry.index == expected_index => {
                    offsets.push(offset);
                    asqns.push(entry.asqn);
                    offset += (FRAME_PREFIX_LEN + len) as u64;
                }
                Ok(entry) => {
                    tracing::warn!(
                        path = %path.display(),
                        expected_index,
                        actual_index = entry.index,
                        "journal index gap, dropping tail"
                    );
                    break;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), offset, error = %e, "corrupt journal frame, dropping tail");
                    break;
                }
            }
        }
        drop(reader);

        let truncated_bytes = file_len - offset;
        if truncated_bytes > 0 {
            file.set_len(offset)?;
            file.sync_all()?;
        }

        Ok(Recovered {
            segment: Self {
                id,
                path: path.to_path_buf(),
                file,
                first_index,
                offsets,
                asqns,
                size: offset,
            },
            truncated_bytes,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn first_index(&self) -> u64 {
        self.first_index
    }

    /// Index the next appended entry will get
    pub fn next_index(&self) -> u64 {
        self.first_index + self.offsets.len() as u64
    }

    pub fn last_index(&self) -> Option<u64> {
        if self.offsets.is_empty() {
            None
        } else {
            Some(self.next_index() - 1)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn contains(&self, index: u64) -> bool {
        index >= self.first_index && index < self.next_index()
    }

    /// Asqns of the entries in this segment, in index order
    pub fn asqns(&self) -> &[i64] {
        &self.asqns
    }

    /// Append a frame; the entry's index must be `next_index()`
    pub fn append(&mut self, entry: &LogEntry) -> Result<(), JournalError> {
        let frame = entry.encode_frame();
        self.file.seek(SeekFrom::Start(self.size))?;
        self.file.write_all(&frame)?;
        self.file.sync_data()?;

        self.offsets.push(self.size);
        self.asqns.push(entry.asqn);
        self.size += frame.len() as u64;
        Ok(())
    }

    /// Read the entry at `index`
    pub fn read(&mut self, index: u64) -> Result<LogEntry, JournalError> {
        let position = (index - self.first_index) as usize;
        let offset = self.offsets[position];

        self.file.seek(SeekFrom::Start(offset))?;
        let mut prefix = [0u8; FRAME_PREFIX_LEN];
        self.file.read_exact(&mut prefix)?;
        let (len, crc) = decode_prefix(&prefix);
        let mut body = vec![0u8; len];
        self.file.read_exact(&mut body)?;

        LogEntry::decode_body(&body, crc).map_err(|e| JournalError::Corrupted {
            segment: self.path.clone(),
            offset,
            reason: e.to_string(),
        })
    }

    /// Drop every entry after `index`
    ///
    /// An `index` below the first entry empties the segment.
    pub fn truncate_after(&mut self, index: Option<u64>) -> Result<(), JournalError> {
        let keep = match index {
            Some(i) if i >= self.first_index => ((i - self.first_index) + 1) as usize,
            _ => 0,
        };
        if keep >= self.offsets.len() {
            return Ok(());
        }

        let new_size = self.offsets[keep];
        self.file.set_len(new_size)?;
        self.file.sync_all()?;
        self.offsets.truncate(keep);
        self.asqns.truncate(keep);
        self.size = new_size;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), JournalError> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Remove the segment file
    pub fn delete(self) -> Result<(), JournalError> {
        let path = self.path;
        drop(self.file);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn invalid_segment(path: &Path, reason: String) -> JournalError {
    JournalError::InvalidSegment {
        path: path.to_path_buf(),
        reason,
    }
}
