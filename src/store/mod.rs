//! Ordered queue store traits and implementations
//!
//! A store holds one score-ordered partition per match type. Entries are
//! ordered by (score, insertion sequence) ascending; all mutating operations
//! on a partition are atomic with respect to each other. Two implementations
//! are provided: `MemoryStore` (volatile) and `DurableStore` (append-only
//! journal with replay recovery).

pub mod durable;
pub mod journal;
pub mod memory;

pub use durable::DurableStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::{EntryId, QueueEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default time-to-live for queue partitions (one hour).
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// An entry together with its ordering score (arrival epoch milliseconds).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: QueueEntry,
    pub score: i64,
}

/// How partition TTLs govern entry reclamation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Each entry's deadline is fixed at insert time; later inserts do not
    /// re-arm other entries. This is the default.
    PerEntry,
    /// Every insert refreshes a single shared deadline; a lapsed deadline
    /// reclaims the whole partition.
    WholePartition,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        TtlPolicy::PerEntry
    }
}

/// Store-level configuration shared by the implementations.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// TTL applied to a partition on first use.
    pub default_ttl: Duration,
    /// Expiry policy.
    pub ttl_policy: TtlPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            ttl_policy: TtlPolicy::default(),
        }
    }
}

/// Durable, score-ordered set of entries per partition.
///
/// Ordering guarantee: scores assigned by callers are clamped so that inserts
/// completing in real-time order carry non-decreasing scores; insertion
/// sequence breaks ties. Mutations on one partition are linearizable; no lock
/// spans partitions except inside `extract_pair`.
#[async_trait]
pub trait OrderedStore: Send + Sync {
    /// Insert an entry. Fails with `DuplicateEntry` if the id already exists
    /// in the partition.
    async fn insert(&self, partition: &str, entry: &QueueEntry, score: i64) -> Result<()>;

    /// Remove an entry by id. Idempotent; returns whether it was present.
    async fn remove(&self, partition: &str, entry_id: EntryId) -> Result<bool>;

    /// Atomically remove two entries, or neither. Returns false (and removes
    /// nothing) if either is already gone.
    async fn extract_pair(
        &self,
        first: (&str, EntryId),
        second: (&str, EntryId),
    ) -> Result<bool>;

    /// Entries within the inclusive `[start, end]` index range, ascending by
    /// score. Does not mutate.
    async fn range(&self, partition: &str, start: usize, end: usize) -> Result<Vec<ScoredEntry>>;

    /// Atomically remove and return up to `count` lowest-scored entries.
    async fn pop_min(&self, partition: &str, count: usize) -> Result<Vec<ScoredEntry>>;

    /// Current cardinality of the partition.
    async fn size(&self, partition: &str) -> Result<usize>;

    /// 0-based rank of an entry by score order, or None if absent.
    async fn rank(&self, partition: &str, entry_id: EntryId) -> Result<Option<usize>>;

    /// Set the partition's TTL. Affects entries inserted afterwards.
    async fn set_ttl(&self, partition: &str, ttl: Duration) -> Result<()>;

    /// The partition's TTL, or None if the partition has never been used.
    async fn get_ttl(&self, partition: &str) -> Result<Option<Duration>>;

    /// Remove and return all entries expired as of `now`.
    async fn purge_expired(&self, partition: &str, now: DateTime<Utc>) -> Result<Vec<QueueEntry>>;

    /// Durability barrier: persist all completed mutations.
    async fn flush(&self) -> Result<()>;
}
