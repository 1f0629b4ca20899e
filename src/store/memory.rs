//! In-memory ordered store implementation
//!
//! Each partition is an independent `Mutex`-guarded state holding a
//! `BTreeMap` keyed by (score, insertion sequence). The same state machinery
//! backs the durable store, which journals every applied mutation; the
//! `apply_*` methods therefore report exactly what was written (clamped
//! score, assigned sequence, expiry deadline) and accept fixed values during
//! journal replay.

use crate::error::{QueueError, Result};
use crate::store::{OrderedStore, ScoredEntry, StoreConfig, TtlPolicy};
use crate::types::{EntryId, QueueEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

/// What an insert actually wrote, for journaling and replay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AppliedInsert {
    pub score: i64,
    pub seq: u64,
    pub expires_at: DateTime<Utc>,
}

/// Live contents of one partition, used when compacting the journal.
pub(crate) struct PartitionSnapshot {
    pub name: String,
    pub ttl: Duration,
    pub slots: Vec<(QueueEntry, AppliedInsert)>,
}

#[derive(Debug, Clone)]
struct Slot {
    entry: QueueEntry,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct PartitionState {
    ordered: BTreeMap<(i64, u64), Slot>,
    by_id: HashMap<EntryId, (i64, u64)>,
    ttl: Duration,
    next_seq: u64,
    /// Highest score ever assigned; never decreases, so scores stay
    /// monotonic even after the partition drains.
    score_watermark: i64,
    /// Shared deadline, used only under `TtlPolicy::WholePartition`.
    deadline: Option<DateTime<Utc>>,
}

impl PartitionState {
    fn new(ttl: Duration) -> Self {
        Self {
            ordered: BTreeMap::new(),
            by_id: HashMap::new(),
            ttl,
            next_seq: 0,
            score_watermark: i64::MIN,
            deadline: None,
        }
    }

    fn insert(
        &mut self,
        entry: QueueEntry,
        score: i64,
        now: DateTime<Utc>,
        policy: TtlPolicy,
        fixed: Option<AppliedInsert>,
    ) -> Result<AppliedInsert> {
        if self.by_id.contains_key(&entry.id) {
            return Err(QueueError::DuplicateEntry {
                entry_id: entry.id.to_string(),
            }
            .into());
        }

        let applied = match fixed {
            Some(applied) => applied,
            None => {
                let ttl = chrono::Duration::from_std(self.ttl).map_err(|e| {
                    QueueError::Internal {
                        message: format!("Partition TTL out of range: {}", e),
                    }
                })?;
                AppliedInsert {
                    score: score.max(self.score_watermark),
                    seq: self.next_seq,
                    expires_at: now + ttl,
                }
            }
        };

        self.score_watermark = self.score_watermark.max(applied.score);
        self.next_seq = self.next_seq.max(applied.seq + 1);
        if policy == TtlPolicy::WholePartition {
            self.deadline = Some(applied.expires_at);
        }

        self.by_id.insert(entry.id, (applied.score, applied.seq));
        self.ordered.insert(
            (applied.score, applied.seq),
            Slot {
                entry,
                expires_at: applied.expires_at,
            },
        );
        Ok(applied)
    }

    fn remove(&mut self, entry_id: EntryId) -> Option<QueueEntry> {
        let key = self.by_id.remove(&entry_id)?;
        self.ordered.remove(&key).map(|slot| slot.entry)
    }

    fn contains(&self, entry_id: EntryId) -> bool {
        self.by_id.contains_key(&entry_id)
    }

    fn rank(&self, entry_id: EntryId) -> Option<usize> {
        let key = self.by_id.get(&entry_id)?;
        self.ordered.keys().position(|k| k == key)
    }

    fn range(&self, start: usize, end: usize) -> Vec<ScoredEntry> {
        if end < start {
            return Vec::new();
        }
        self.ordered
            .iter()
            .skip(start)
            .take(end.saturating_sub(start).saturating_add(1))
            .map(|(&(score, _), slot)| ScoredEntry {
                entry: slot.entry.clone(),
                score,
            })
            .collect()
    }

    fn pop_min(&mut self, count: usize) -> Vec<ScoredEntry> {
        let keys: Vec<(i64, u64)> = self.ordered.keys().take(count).copied().collect();
        let mut popped = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(slot) = self.ordered.remove(&key) {
                self.by_id.remove(&slot.entry.id);
                popped.push(ScoredEntry {
                    entry: slot.entry,
                    score: key.0,
                });
            }
        }
        popped
    }

    fn expired_keys(&self, now: DateTime<Utc>, policy: TtlPolicy) -> Vec<(i64, u64)> {
        match policy {
            TtlPolicy::WholePartition => match self.deadline {
                Some(deadline) if deadline <= now => self.ordered.keys().copied().collect(),
                _ => Vec::new(),
            },
            TtlPolicy::PerEntry => self
                .ordered
                .iter()
                .filter(|(_, slot)| slot.expires_at <= now)
                .map(|(&key, _)| key)
                .collect(),
        }
    }

    fn purge_expired(&mut self, now: DateTime<Utc>, policy: TtlPolicy) -> Vec<QueueEntry> {
        let expired_keys = self.expired_keys(now, policy);
        let mut purged = Vec::with_capacity(expired_keys.len());
        for key in expired_keys {
            if let Some(slot) = self.ordered.remove(&key) {
                self.by_id.remove(&slot.entry.id);
                purged.push(slot.entry);
            }
        }
        if policy == TtlPolicy::WholePartition && self.ordered.is_empty() {
            self.deadline = None;
        }
        purged
    }
}

/// Volatile ordered store, also serving as the durable store's index.
pub struct MemoryStore {
    config: StoreConfig,
    partitions: RwLock<HashMap<String, Arc<Mutex<PartitionState>>>>,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Partition handle, creating the partition on first use.
    fn partition(&self, name: &str) -> Result<Arc<Mutex<PartitionState>>> {
        {
            let partitions = self.partitions.read().map_err(|_| QueueError::Internal {
                message: "Failed to acquire partitions lock".to_string(),
            })?;
            if let Some(state) = partitions.get(name) {
                return Ok(state.clone());
            }
        }

        let mut partitions = self.partitions.write().map_err(|_| QueueError::Internal {
            message: "Failed to acquire partitions lock".to_string(),
        })?;
        Ok(partitions
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(PartitionState::new(self.config.default_ttl))))
            .clone())
    }

    /// Partition handle without creating it; read paths use this so queries
    /// against unknown partitions stay side-effect free.
    fn partition_if_exists(&self, name: &str) -> Result<Option<Arc<Mutex<PartitionState>>>> {
        let partitions = self.partitions.read().map_err(|_| QueueError::Internal {
            message: "Failed to acquire partitions lock".to_string(),
        })?;
        Ok(partitions.get(name).cloned())
    }

    fn lock_state<'a>(
        state: &'a Arc<Mutex<PartitionState>>,
    ) -> Result<MutexGuard<'a, PartitionState>> {
        state.lock().map_err(|_| {
            QueueError::Internal {
                message: "Failed to acquire partition lock".to_string(),
            }
            .into()
        })
    }

    pub(crate) fn apply_insert(
        &self,
        partition: &str,
        entry: QueueEntry,
        score: i64,
        now: DateTime<Utc>,
        fixed: Option<AppliedInsert>,
    ) -> Result<AppliedInsert> {
        let state = self.partition(partition)?;
        let mut guard = Self::lock_state(&state)?;
        guard.insert(entry, score, now, self.config.ttl_policy, fixed)
    }

    pub(crate) fn apply_remove(&self, partition: &str, entry_id: EntryId) -> Result<bool> {
        match self.partition_if_exists(partition)? {
            Some(state) => {
                let mut guard = Self::lock_state(&state)?;
                Ok(guard.remove(entry_id).is_some())
            }
            None => Ok(false),
        }
    }

    pub(crate) fn apply_extract_pair(
        &self,
        first: (&str, EntryId),
        second: (&str, EntryId),
    ) -> Result<bool> {
        let (first_state, second_state) = match (
            self.partition_if_exists(first.0)?,
            self.partition_if_exists(second.0)?,
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(false),
        };

        if first.0 == second.0 {
            let mut guard = Self::lock_state(&first_state)?;
            if !guard.contains(first.1) || !guard.contains(second.1) {
                return Ok(false);
            }
            guard.remove(first.1);
            guard.remove(second.1);
            return Ok(true);
        }

        // Cross-partition extraction: lock in name order so two concurrent
        // extractions can never deadlock.
        let (mut lo, mut hi) = if first.0 < second.0 {
            (
                (Self::lock_state(&first_state)?, first.1),
                (Self::lock_state(&second_state)?, second.1),
            )
        } else {
            (
                (Self::lock_state(&second_state)?, second.1),
                (Self::lock_state(&first_state)?, first.1),
            )
        };

        if !lo.0.contains(lo.1) || !hi.0.contains(hi.1) {
            return Ok(false);
        }
        lo.0.remove(lo.1);
        hi.0.remove(hi.1);
        Ok(true)
    }

    pub(crate) fn apply_pop_min(&self, partition: &str, count: usize) -> Result<Vec<ScoredEntry>> {
        match self.partition_if_exists(partition)? {
            Some(state) => {
                let mut guard = Self::lock_state(&state)?;
                Ok(guard.pop_min(count))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Set the partition TTL, returning the previous value so a failed
    /// journal write can restore it.
    pub(crate) fn apply_set_ttl(&self, partition: &str, ttl: Duration) -> Result<Duration> {
        let state = self.partition(partition)?;
        let mut guard = Self::lock_state(&state)?;
        let previous = guard.ttl;
        guard.ttl = ttl;
        Ok(previous)
    }

    pub(crate) fn contains(&self, partition: &str, entry_id: EntryId) -> Result<bool> {
        match self.partition_if_exists(partition)? {
            Some(state) => {
                let guard = Self::lock_state(&state)?;
                Ok(guard.contains(entry_id))
            }
            None => Ok(false),
        }
    }

    /// Lowest `count` entries without removing them.
    pub(crate) fn peek_min(&self, partition: &str, count: usize) -> Result<Vec<ScoredEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        match self.partition_if_exists(partition)? {
            Some(state) => {
                let guard = Self::lock_state(&state)?;
                Ok(guard.range(0, count - 1))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Entries past their deadline without removing them.
    pub(crate) fn peek_expired(
        &self,
        partition: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>> {
        match self.partition_if_exists(partition)? {
            Some(state) => {
                let guard = Self::lock_state(&state)?;
                let expired = guard
                    .expired_keys(now, self.config.ttl_policy)
                    .into_iter()
                    .filter_map(|key| guard.ordered.get(&key).map(|slot| slot.entry.clone()))
                    .collect();
                Ok(expired)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Full dump of live state, in order, for journal compaction.
    pub(crate) fn snapshot(&self) -> Result<Vec<PartitionSnapshot>> {
        let partitions = self.partitions.read().map_err(|_| QueueError::Internal {
            message: "Failed to acquire partitions lock".to_string(),
        })?;
        let mut out = Vec::with_capacity(partitions.len());
        for (name, state) in partitions.iter() {
            let guard = Self::lock_state(state)?;
            let slots = guard
                .ordered
                .iter()
                .map(|(&(score, seq), slot)| {
                    (
                        slot.entry.clone(),
                        AppliedInsert {
                            score,
                            seq,
                            expires_at: slot.expires_at,
                        },
                    )
                })
                .collect();
            out.push(PartitionSnapshot {
                name: name.clone(),
                ttl: guard.ttl,
                slots,
            });
        }
        Ok(out)
    }

    pub(crate) fn apply_purge_expired(
        &self,
        partition: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>> {
        match self.partition_if_exists(partition)? {
            Some(state) => {
                let mut guard = Self::lock_state(&state)?;
                Ok(guard.purge_expired(now, self.config.ttl_policy))
            }
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl OrderedStore for MemoryStore {
    async fn insert(&self, partition: &str, entry: &QueueEntry, score: i64) -> Result<()> {
        self.apply_insert(partition, entry.clone(), score, Utc::now(), None)?;
        Ok(())
    }

    async fn remove(&self, partition: &str, entry_id: EntryId) -> Result<bool> {
        self.apply_remove(partition, entry_id)
    }

    async fn extract_pair(
        &self,
        first: (&str, EntryId),
        second: (&str, EntryId),
    ) -> Result<bool> {
        self.apply_extract_pair(first, second)
    }

    async fn range(&self, partition: &str, start: usize, end: usize) -> Result<Vec<ScoredEntry>> {
        match self.partition_if_exists(partition)? {
            Some(state) => {
                let guard = Self::lock_state(&state)?;
                Ok(guard.range(start, end))
            }
            None => Ok(Vec::new()),
        }
    }

    async fn pop_min(&self, partition: &str, count: usize) -> Result<Vec<ScoredEntry>> {
        self.apply_pop_min(partition, count)
    }

    async fn size(&self, partition: &str) -> Result<usize> {
        match self.partition_if_exists(partition)? {
            Some(state) => {
                let guard = Self::lock_state(&state)?;
                Ok(guard.ordered.len())
            }
            None => Ok(0),
        }
    }

    async fn rank(&self, partition: &str, entry_id: EntryId) -> Result<Option<usize>> {
        match self.partition_if_exists(partition)? {
            Some(state) => {
                let guard = Self::lock_state(&state)?;
                Ok(guard.rank(entry_id))
            }
            None => Ok(None),
        }
    }

    async fn set_ttl(&self, partition: &str, ttl: Duration) -> Result<()> {
        self.apply_set_ttl(partition, ttl)?;
        Ok(())
    }

    async fn get_ttl(&self, partition: &str) -> Result<Option<Duration>> {
        match self.partition_if_exists(partition)? {
            Some(state) => {
                let guard = Self::lock_state(&state)?;
                Ok(Some(guard.ttl))
            }
            None => Ok(None),
        }
    }

    async fn purge_expired(&self, partition: &str, now: DateTime<Utc>) -> Result<Vec<QueueEntry>> {
        self.apply_purge_expired(partition, now)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchType, Player};
    use crate::utils::{current_timestamp, generate_entry_id};
    use proptest::prelude::*;

    const PART: &str = "queue:rated";

    fn entry(address: &str, elo: u32) -> QueueEntry {
        QueueEntry {
            id: generate_entry_id(),
            player: Player {
                address: address.to_string(),
                elo,
                joined_at: current_timestamp(),
            },
            match_type: MatchType::Rated,
            invite_address: None,
            max_elo_diff: Some(200),
        }
    }

    #[tokio::test]
    async fn test_insert_and_order() {
        let store = MemoryStore::default();
        let (a, b, c) = (entry("a", 1500), entry("b", 1550), entry("c", 1600));

        store.insert(PART, &a, 100).await.unwrap();
        store.insert(PART, &b, 200).await.unwrap();
        store.insert(PART, &c, 150).await.unwrap();

        // c's score is clamped up to the watermark set by b.
        let entries = store.range(PART, 0, usize::MAX - 1).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].entry.id, a.id);
        assert_eq!(entries[1].entry.id, b.id);
        assert_eq!(entries[2].entry.id, c.id);
        assert!(entries.windows(2).all(|w| w[0].score <= w[1].score));
    }

    #[tokio::test]
    async fn test_duplicate_insert_fails() {
        let store = MemoryStore::default();
        let a = entry("a", 1500);

        store.insert(PART, &a, 100).await.unwrap();
        let err = store.insert(PART, &a, 200).await.unwrap_err();
        let queue_err = err.downcast_ref::<QueueError>().unwrap();
        assert!(matches!(queue_err, QueueError::DuplicateEntry { .. }));
        assert_eq!(store.size(PART).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = MemoryStore::default();
        let a = entry("a", 1500);

        store.insert(PART, &a, 100).await.unwrap();
        assert!(store.remove(PART, a.id).await.unwrap());
        assert!(!store.remove(PART, a.id).await.unwrap());
        assert!(!store.remove("queue:casual", a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_pop_min_takes_oldest() {
        let store = MemoryStore::default();
        let (a, b, c) = (entry("a", 1500), entry("b", 1550), entry("c", 1600));
        store.insert(PART, &a, 100).await.unwrap();
        store.insert(PART, &b, 200).await.unwrap();
        store.insert(PART, &c, 300).await.unwrap();

        let popped = store.pop_min(PART, 2).await.unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(popped[0].entry.id, a.id);
        assert_eq!(popped[1].entry.id, b.id);
        assert_eq!(store.size(PART).await.unwrap(), 1);

        // Asking for more than remain returns what's left.
        let rest = store.pop_min(PART, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].entry.id, c.id);
    }

    #[tokio::test]
    async fn test_rank() {
        let store = MemoryStore::default();
        let (a, b) = (entry("a", 1500), entry("b", 1550));
        store.insert(PART, &a, 100).await.unwrap();
        store.insert(PART, &b, 200).await.unwrap();

        assert_eq!(store.rank(PART, a.id).await.unwrap(), Some(0));
        assert_eq!(store.rank(PART, b.id).await.unwrap(), Some(1));

        store.remove(PART, a.id).await.unwrap();
        assert_eq!(store.rank(PART, b.id).await.unwrap(), Some(0));
        assert_eq!(store.rank(PART, a.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_extract_pair_all_or_nothing() {
        let store = MemoryStore::default();
        let (a, b, c) = (entry("a", 1500), entry("b", 1550), entry("c", 1600));
        store.insert(PART, &a, 100).await.unwrap();
        store.insert(PART, &b, 200).await.unwrap();
        store.insert(PART, &c, 300).await.unwrap();

        assert!(store
            .extract_pair((PART, a.id), (PART, b.id))
            .await
            .unwrap());
        assert_eq!(store.size(PART).await.unwrap(), 1);

        // One of the pair already gone: nothing is removed.
        assert!(!store
            .extract_pair((PART, a.id), (PART, c.id))
            .await
            .unwrap());
        assert_eq!(store.size(PART).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_extract_pair_across_partitions() {
        let store = MemoryStore::default();
        let a = entry("a", 1500);
        let b = entry("b", 1550);
        store.insert("queue:invite", &a, 100).await.unwrap();
        store.insert("queue:casual", &b, 100).await.unwrap();

        assert!(store
            .extract_pair(("queue:invite", a.id), ("queue:casual", b.id))
            .await
            .unwrap());
        assert_eq!(store.size("queue:invite").await.unwrap(), 0);
        assert_eq!(store.size("queue:casual").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_score_monotonic_after_drain() {
        let store = MemoryStore::default();
        let a = entry("a", 1500);
        store.insert(PART, &a, 500).await.unwrap();
        store.remove(PART, a.id).await.unwrap();

        // A later insert with a regressed clock still lands at or above the
        // watermark.
        let b = entry("b", 1550);
        store.insert(PART, &b, 100).await.unwrap();
        let entries = store.range(PART, 0, 10).await.unwrap();
        assert_eq!(entries[0].score, 500);
    }

    #[tokio::test]
    async fn test_per_entry_expiry() {
        let store = MemoryStore::new(StoreConfig {
            default_ttl: Duration::from_secs(60),
            ttl_policy: TtlPolicy::PerEntry,
        });
        let a = entry("a", 1500);
        store.insert(PART, &a, 100).await.unwrap();

        let not_yet = store
            .purge_expired(PART, current_timestamp())
            .await
            .unwrap();
        assert!(not_yet.is_empty());

        let later = current_timestamp() + chrono::Duration::seconds(120);
        let purged = store.purge_expired(PART, later).await.unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].id, a.id);
        assert_eq!(store.size(PART).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_per_entry_ttl_not_rearmed_by_insert() {
        let store = MemoryStore::new(StoreConfig {
            default_ttl: Duration::from_secs(60),
            ttl_policy: TtlPolicy::PerEntry,
        });
        let old = entry("old", 1500);
        let fixed = AppliedInsert {
            score: 100,
            seq: 0,
            expires_at: current_timestamp() - chrono::Duration::seconds(1),
        };
        store
            .apply_insert(PART, old.clone(), 100, current_timestamp(), Some(fixed))
            .unwrap();

        // A fresh insert does not save the already-expired entry.
        let fresh = entry("fresh", 1550);
        store.insert(PART, &fresh, 200).await.unwrap();

        let purged = store
            .purge_expired(PART, current_timestamp())
            .await
            .unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].id, old.id);
        assert_eq!(store.size(PART).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_whole_partition_ttl_rearmed_by_insert() {
        let store = MemoryStore::new(StoreConfig {
            default_ttl: Duration::from_secs(60),
            ttl_policy: TtlPolicy::WholePartition,
        });
        let a = entry("a", 1500);
        store.insert(PART, &a, 100).await.unwrap();

        // The second insert pushes the shared deadline forward for both.
        let b = entry("b", 1550);
        store.insert(PART, &b, 200).await.unwrap();

        let within = current_timestamp() + chrono::Duration::seconds(30);
        assert!(store.purge_expired(PART, within).await.unwrap().is_empty());

        let after = current_timestamp() + chrono::Duration::seconds(120);
        let purged = store.purge_expired(PART, after).await.unwrap();
        assert_eq!(purged.len(), 2);
    }

    #[tokio::test]
    async fn test_ttl_accessors() {
        let store = MemoryStore::default();
        assert_eq!(store.get_ttl(PART).await.unwrap(), None);

        store.insert(PART, &entry("a", 1500), 100).await.unwrap();
        assert_eq!(
            store.get_ttl(PART).await.unwrap(),
            Some(Duration::from_secs(3600))
        );

        store
            .set_ttl(PART, Duration::from_secs(120))
            .await
            .unwrap();
        assert_eq!(
            store.get_ttl(PART).await.unwrap(),
            Some(Duration::from_secs(120))
        );
    }

    proptest! {
        // Whatever order scores arrive in, the stored sequence is sorted and
        // every id survives until removed.
        #[test]
        fn prop_range_is_sorted(scores in proptest::collection::vec(0i64..1_000_000, 1..50)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            rt.block_on(async {
                let store = MemoryStore::default();
                for (i, score) in scores.iter().enumerate() {
                    let e = entry(&format!("p{}", i), 1500);
                    store.insert(PART, &e, *score).await.unwrap();
                }
                let entries = store.range(PART, 0, usize::MAX - 1).await.unwrap();
                assert_eq!(entries.len(), scores.len());
                assert!(entries.windows(2).all(|w| w[0].score <= w[1].score));
            });
        }
    }
}
