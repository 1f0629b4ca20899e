//! Durable ordered store
//!
//! Wraps the in-memory store with an append-only journal. Every mutation
//! holds the journal lock across the index update and the journal append,
//! so index and journal can never diverge: removals are journaled before
//! they are applied, and an insert whose append fails is rolled out of the
//! index again. A restart replays the journal and lands in exactly the
//! pre-crash state. Sequence numbers and expiry deadlines are journaled
//! alongside each insert, which keeps replay deterministic regardless of
//! the clock at recovery time.

use crate::codec::EntryCodec;
use crate::error::{QueueError, Result};
use crate::store::journal::{self, FsyncPolicy, JournalRecord, JournalWriter};
use crate::store::memory::{AppliedInsert, MemoryStore};
use crate::store::{OrderedStore, ScoredEntry, StoreConfig};
use crate::types::{EntryId, QueueEntry};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct DurableStore {
    index: MemoryStore,
    journal: Mutex<JournalWriter>,
    path: PathBuf,
    fsync_policy: FsyncPolicy,
}

impl DurableStore {
    /// Open the store, replaying any existing journal into the index.
    pub fn open(
        config: StoreConfig,
        path: impl Into<PathBuf>,
        fsync_policy: FsyncPolicy,
    ) -> Result<Self> {
        let path = path.into();
        let index = MemoryStore::new(config);

        let records = journal::read_records(&path)?;
        let replayed = records.len();
        for record in records {
            Self::replay(&index, record)?;
        }
        if replayed > 0 {
            info!(records = replayed, path = %path.display(), "Replayed journal");
        }

        let journal = JournalWriter::open(&path, fsync_policy)?;
        Ok(Self {
            index,
            journal: Mutex::new(journal),
            path,
            fsync_policy,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn replay(index: &MemoryStore, record: JournalRecord) -> Result<()> {
        match record {
            JournalRecord::Insert {
                partition,
                score,
                seq,
                expires_at_ms,
                payload,
            } => {
                let entry = match EntryCodec::decode(&payload) {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(partition = %partition, error = %e, "Skipping undecodable journaled entry");
                        return Ok(());
                    }
                };
                let expires_at = millis_to_datetime(expires_at_ms)?;
                let fixed = AppliedInsert {
                    score,
                    seq,
                    expires_at,
                };
                // A compaction racing an insert can leave the same record
                // twice; the second copy is a no-op, not a lost journal.
                if let Err(e) = index.apply_insert(&partition, entry, score, expires_at, Some(fixed))
                {
                    warn!(partition = %partition, error = %e, "Skipping unreplayable insert record");
                }
            }
            JournalRecord::Remove {
                partition,
                entry_id,
            } => {
                index.apply_remove(&partition, entry_id)?;
            }
            JournalRecord::Extract {
                first_partition,
                first_id,
                second_partition,
                second_id,
            } => {
                index.apply_extract_pair(
                    (first_partition.as_str(), first_id),
                    (second_partition.as_str(), second_id),
                )?;
            }
            JournalRecord::SetTtl { partition, ttl_ms } => {
                index.apply_set_ttl(&partition, Duration::from_millis(ttl_ms))?;
            }
        }
        Ok(())
    }

    /// Every mutation runs under this lock, so the index and the journal
    /// always move together.
    fn lock_journal(&self) -> Result<std::sync::MutexGuard<'_, JournalWriter>> {
        self.journal.lock().map_err(|_| {
            QueueError::Internal {
                message: "Failed to acquire journal lock".to_string(),
            }
            .into()
        })
    }

    fn insert_record(
        partition: &str,
        entry: &QueueEntry,
        applied: &AppliedInsert,
    ) -> Result<JournalRecord> {
        Ok(JournalRecord::Insert {
            partition: partition.to_string(),
            score: applied.score,
            seq: applied.seq,
            expires_at_ms: applied.expires_at.timestamp_millis(),
            payload: EntryCodec::encode(entry)?,
        })
    }

    /// Rewrite the journal from live state, dropping records for entries
    /// that are no longer queued.
    pub fn compact(&self) -> Result<()> {
        // Snapshot only after taking the journal lock, so no mutation can
        // land in the snapshot and in the rewritten journal both.
        let mut journal = self.lock_journal()?;
        let snapshot = self.index.snapshot()?;

        let tmp_path = self.path.with_extension("compact");
        let mut tmp = JournalWriter::open(&tmp_path, self.fsync_policy)?;
        let mut written = 0usize;
        for partition in &snapshot {
            tmp.append(&JournalRecord::SetTtl {
                partition: partition.name.clone(),
                ttl_ms: partition.ttl.as_millis() as u64,
            })?;
            for (entry, applied) in &partition.slots {
                tmp.append(&Self::insert_record(&partition.name, entry, applied)?)?;
                written += 1;
            }
        }
        tmp.sync()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path).map_err(|e| QueueError::StoreUnavailable {
            message: format!("Failed to swap compacted journal: {}", e),
        })?;
        *journal = JournalWriter::open(&self.path, self.fsync_policy)?;
        debug!(entries = written, "Compacted journal");
        Ok(())
    }
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| {
            QueueError::Codec {
                reason: format!("Journaled timestamp out of range: {}", ms),
            }
            .into()
        })
}

#[async_trait]
impl OrderedStore for DurableStore {
    async fn insert(&self, partition: &str, entry: &QueueEntry, score: i64) -> Result<()> {
        let payload = EntryCodec::encode(entry)?;
        let mut journal = self.lock_journal()?;
        let applied =
            self.index
                .apply_insert(partition, entry.clone(), score, Utc::now(), None)?;
        let record = JournalRecord::Insert {
            partition: partition.to_string(),
            score: applied.score,
            seq: applied.seq,
            expires_at_ms: applied.expires_at.timestamp_millis(),
            payload,
        };
        if let Err(e) = journal.append(&record) {
            // An entry that failed to reach disk must not stay visible as
            // a match candidate.
            self.index.apply_remove(partition, entry.id)?;
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, partition: &str, entry_id: EntryId) -> Result<bool> {
        let mut journal = self.lock_journal()?;
        if !self.index.contains(partition, entry_id)? {
            return Ok(false);
        }
        journal.append(&JournalRecord::Remove {
            partition: partition.to_string(),
            entry_id,
        })?;
        self.index.apply_remove(partition, entry_id)?;
        Ok(true)
    }

    async fn extract_pair(
        &self,
        first: (&str, EntryId),
        second: (&str, EntryId),
    ) -> Result<bool> {
        let mut journal = self.lock_journal()?;
        if !self.index.contains(first.0, first.1)? || !self.index.contains(second.0, second.1)? {
            return Ok(false);
        }
        journal.append(&JournalRecord::Extract {
            first_partition: first.0.to_string(),
            first_id: first.1,
            second_partition: second.0.to_string(),
            second_id: second.1,
        })?;
        self.index.apply_extract_pair(first, second)?;
        Ok(true)
    }

    async fn range(&self, partition: &str, start: usize, end: usize) -> Result<Vec<ScoredEntry>> {
        self.index.range(partition, start, end).await
    }

    async fn pop_min(&self, partition: &str, count: usize) -> Result<Vec<ScoredEntry>> {
        let mut journal = self.lock_journal()?;
        let popped = self.index.peek_min(partition, count)?;
        for scored in &popped {
            journal.append(&JournalRecord::Remove {
                partition: partition.to_string(),
                entry_id: scored.entry.id,
            })?;
        }
        for scored in &popped {
            self.index.apply_remove(partition, scored.entry.id)?;
        }
        Ok(popped)
    }

    async fn size(&self, partition: &str) -> Result<usize> {
        self.index.size(partition).await
    }

    async fn rank(&self, partition: &str, entry_id: EntryId) -> Result<Option<usize>> {
        self.index.rank(partition, entry_id).await
    }

    async fn set_ttl(&self, partition: &str, ttl: Duration) -> Result<()> {
        let mut journal = self.lock_journal()?;
        let previous = self.index.apply_set_ttl(partition, ttl)?;
        if let Err(e) = journal.append(&JournalRecord::SetTtl {
            partition: partition.to_string(),
            ttl_ms: ttl.as_millis() as u64,
        }) {
            self.index.apply_set_ttl(partition, previous)?;
            return Err(e);
        }
        Ok(())
    }

    async fn get_ttl(&self, partition: &str) -> Result<Option<Duration>> {
        self.index.get_ttl(partition).await
    }

    async fn purge_expired(&self, partition: &str, now: DateTime<Utc>) -> Result<Vec<QueueEntry>> {
        let mut journal = self.lock_journal()?;
        let expired = self.index.peek_expired(partition, now)?;
        for entry in &expired {
            journal.append(&JournalRecord::Remove {
                partition: partition.to_string(),
                entry_id: entry.id,
            })?;
        }
        for entry in &expired {
            self.index.apply_remove(partition, entry.id)?;
        }
        Ok(expired)
    }

    async fn flush(&self) -> Result<()> {
        let mut journal = self.lock_journal()?;
        journal.sync()
    }
}
