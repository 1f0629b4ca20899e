//! Append-only mutation journal
//!
//! Every mutation applied to the durable store is framed and appended here,
//! then replayed on startup to rebuild the in-memory index. Frame layout:
//!
//! ```text
//! [body_len: u32][checksum: u32][body: bincode(JournalRecord)]
//! ```
//!
//! The checksum is CRC32C over the body. Replay stops at the first frame
//! that fails to parse or verify, which treats a torn tail from a crash
//! mid-append as the end of the journal.

use crate::error::{QueueError, Result};
use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Largest body we will accept when reading. Anything above this is
/// corruption, not a real record.
const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

/// One durable mutation. Insert carries the codec-encoded entry payload so
/// the journal format does not depend on the entry struct layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord {
    Insert {
        partition: String,
        score: i64,
        seq: u64,
        expires_at_ms: i64,
        payload: Vec<u8>,
    },
    Remove {
        partition: String,
        entry_id: uuid::Uuid,
    },
    Extract {
        first_partition: String,
        first_id: uuid::Uuid,
        second_partition: String,
        second_id: uuid::Uuid,
    },
    SetTtl {
        partition: String,
        ttl_ms: u64,
    },
}

/// Controls when appended records are fsynced to disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FsyncPolicy {
    /// Fsync after every append. Slowest, loses nothing on power failure.
    EveryWrite,
    /// Fsync every N appends.
    EveryN(usize),
    /// Never fsync explicitly; rely on the OS page cache.
    Never,
}

impl Default for FsyncPolicy {
    fn default() -> Self {
        FsyncPolicy::EveryWrite
    }
}

/// Append-only writer over a single journal file.
pub struct JournalWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    fsync_policy: FsyncPolicy,
    writes_since_fsync: usize,
}

impl JournalWriter {
    /// Open the journal for appending, creating it if absent.
    pub fn open(path: impl Into<PathBuf>, fsync_policy: FsyncPolicy) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| QueueError::StoreUnavailable {
                message: format!("Failed to create journal directory: {}", e),
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| QueueError::StoreUnavailable {
                message: format!("Failed to open journal {}: {}", path.display(), e),
            })?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            fsync_policy,
            writes_since_fsync: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and apply the fsync policy.
    pub fn append(&mut self, record: &JournalRecord) -> Result<()> {
        let frame = encode_frame(record)?;
        self.writer
            .write_all(&frame)
            .map_err(|e| QueueError::StoreUnavailable {
                message: format!("Journal write failed: {}", e),
            })?;

        self.writes_since_fsync += 1;
        let should_sync = match self.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => self.writes_since_fsync >= n.max(1),
            FsyncPolicy::Never => false,
        };
        if should_sync {
            self.sync()?;
        } else {
            self.writer.flush().map_err(|e| QueueError::StoreUnavailable {
                message: format!("Journal flush failed: {}", e),
            })?;
        }
        Ok(())
    }

    /// Flush buffered frames and fsync the file.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| QueueError::StoreUnavailable {
            message: format!("Journal flush failed: {}", e),
        })?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(|e| QueueError::StoreUnavailable {
                message: format!("Journal fsync failed: {}", e),
            })?;
        self.writes_since_fsync = 0;
        Ok(())
    }
}

fn encode_frame(record: &JournalRecord) -> Result<Vec<u8>> {
    let body = bincode::serialize(record).map_err(|e| QueueError::Codec {
        reason: format!("Failed to serialize journal record: {}", e),
    })?;
    let mut frame = Vec::with_capacity(8 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32c(&body).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Read every intact record from a journal file.
///
/// A missing file is an empty journal. A corrupt or truncated frame ends
/// the journal at that point; everything before it is returned.
pub fn read_records(path: &Path) -> Result<Vec<JournalRecord>> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(QueueError::StoreUnavailable {
                message: format!("Failed to open journal {}: {}", path.display(), e),
            }
            .into())
        }
    };

    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| QueueError::StoreUnavailable {
            message: format!("Failed to read journal {}: {}", path.display(), e),
        })?;

    let mut records = Vec::new();
    let mut pos = 0usize;
    while pos + 8 <= data.len() {
        let body_len =
            u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        if body_len > MAX_BODY_LEN {
            warn!(
                offset = pos,
                body_len, "Implausible journal frame length, truncating replay here"
            );
            break;
        }
        let expected_crc = u32::from_le_bytes([
            data[pos + 4],
            data[pos + 5],
            data[pos + 6],
            data[pos + 7],
        ]);
        let body_start = pos + 8;
        let body_end = body_start + body_len;
        if body_end > data.len() {
            warn!(offset = pos, "Torn journal tail, truncating replay here");
            break;
        }
        let body = &data[body_start..body_end];
        if crc32c(body) != expected_crc {
            warn!(offset = pos, "Journal checksum mismatch, truncating replay here");
            break;
        }
        match bincode::deserialize::<JournalRecord>(body) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(
                    offset = pos,
                    error = %e,
                    "Undecodable journal record, truncating replay here"
                );
                break;
            }
        }
        pos = body_end;
    }
    Ok(records)
}
