//! Queue coordinator
//!
//! The coordinator owns the write path: it validates entries, assigns
//! arrival scores, keeps a player index so one player holds at most one
//! live entry, and drives matching and expiry against the store. All
//! removals go through the store's atomic operations, so a matching pass
//! racing a cancel loses cleanly and simply retries on the next pass.

use crate::error::{QueueError, Result};
use crate::matching::{CompatibilityMatcher, MatchingConfig, PairMatcher, ProposedPair};
use crate::metrics::MetricsCollector;
use crate::notify::MatchNotifier;
use crate::store::{OrderedStore, ScoredEntry};
use crate::types::{
    EntryId, MatchId, MatchResult, MatchType, Player, PlayerAddress, QueueEntry, QueueStatus,
};
use crate::utils::{current_timestamp, generate_entry_id, generate_match_id};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How many entries one matching pass inspects per partition.
const SCAN_WINDOW: usize = 1024;

/// How many settled matches stay queryable by id, for players polling
/// after their entry left the queue.
const MATCH_HISTORY_LIMIT: usize = 256;

/// Statistics about coordinator activity
#[derive(Debug, Clone, Default)]
pub struct QueueCoordinatorStats {
    /// Total entries accepted into the queue
    pub entries_enqueued: u64,
    /// Total matches created
    pub matches_created: u64,
    /// Total entries cancelled by their player
    pub entries_cancelled: u64,
    /// Total entries dropped by expiry
    pub entries_expired: u64,
    /// Total invites accepted directly
    pub invites_accepted: u64,
    /// Current number of waiting entries across all partitions
    pub entries_waiting: usize,
}

/// What the coordinator remembers about a live entry without hitting the
/// store.
#[derive(Debug, Clone)]
struct IndexedEntry {
    match_type: MatchType,
    address: PlayerAddress,
    joined_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default)]
struct EntryIndex {
    by_entry: HashMap<EntryId, IndexedEntry>,
    by_player: HashMap<PlayerAddress, EntryId>,
}

impl EntryIndex {
    fn insert(&mut self, entry: &QueueEntry) {
        self.by_entry.insert(
            entry.id,
            IndexedEntry {
                match_type: entry.match_type,
                address: entry.player.address.clone(),
                joined_at: entry.player.joined_at,
            },
        );
        self.by_player.insert(entry.player.address.clone(), entry.id);
    }

    fn remove(&mut self, entry_id: EntryId) -> Option<IndexedEntry> {
        let indexed = self.by_entry.remove(&entry_id)?;
        // Only clear the player slot if it still points at this entry.
        if self.by_player.get(&indexed.address) == Some(&entry_id) {
            self.by_player.remove(&indexed.address);
        }
        Some(indexed)
    }
}

/// The main queue coordinator
#[derive(Clone)]
pub struct QueueCoordinator {
    /// Durable ordered store backing all partitions
    store: Arc<dyn OrderedStore>,
    /// Pair matcher
    matcher: Arc<dyn PairMatcher>,
    /// Matching configuration
    matching_config: MatchingConfig,
    /// Notifier for matches and expirations
    notifier: Arc<dyn MatchNotifier>,
    /// Live-entry index
    index: Arc<RwLock<EntryIndex>>,
    /// Recently settled matches, newest last
    recent_matches: Arc<RwLock<VecDeque<MatchResult>>>,
    /// Coordinator statistics
    stats: Arc<RwLock<QueueCoordinatorStats>>,
    /// Metrics collector
    metrics_collector: Arc<MetricsCollector>,
}

impl QueueCoordinator {
    /// Create a new coordinator with the default matcher
    pub fn new(store: Arc<dyn OrderedStore>, notifier: Arc<dyn MatchNotifier>) -> Result<Self> {
        let metrics_collector = Arc::new(MetricsCollector::new()?);
        Self::with_matcher_and_metrics(
            store,
            notifier,
            Arc::new(CompatibilityMatcher::new()),
            MatchingConfig::default(),
            metrics_collector,
        )
    }

    /// Create with custom matcher, configuration, and metrics
    pub fn with_matcher_and_metrics(
        store: Arc<dyn OrderedStore>,
        notifier: Arc<dyn MatchNotifier>,
        matcher: Arc<dyn PairMatcher>,
        matching_config: MatchingConfig,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<Self> {
        Ok(Self {
            store,
            matcher,
            matching_config,
            notifier,
            index: Arc::new(RwLock::new(EntryIndex::default())),
            recent_matches: Arc::new(RwLock::new(VecDeque::new())),
            stats: Arc::new(RwLock::new(QueueCoordinatorStats::default())),
            metrics_collector,
        })
    }

    /// Rebuild the live-entry index from the store after a restart.
    ///
    /// Returns the number of entries recovered.
    pub async fn recover(&self) -> Result<usize> {
        let mut recovered = 0usize;
        for match_type in MatchType::ALL {
            let partition = match_type.partition_name();
            let entries = self.store.range(partition, 0, usize::MAX - 1).await?;
            let mut index = self.lock_index_write()?;
            for scored in &entries {
                index.insert(&scored.entry);
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!(entries = recovered, "Recovered queue index from store");
        }
        self.refresh_depth_metrics().await?;
        Ok(recovered)
    }

    /// Add a player to the queue.
    ///
    /// The arrival timestamp in `player.joined_at` becomes the entry's
    /// score, so earlier arrivals always sort first. A player may hold at
    /// most one live entry across all partitions.
    pub async fn enqueue(
        &self,
        player: Player,
        match_type: MatchType,
        invite_address: Option<PlayerAddress>,
        max_elo_diff: Option<u32>,
    ) -> Result<QueueEntry> {
        let entry = QueueEntry {
            id: generate_entry_id(),
            player,
            match_type,
            invite_address,
            max_elo_diff,
        };
        entry.validate()?;

        // Reserve the player slot before the store write so two concurrent
        // enqueues for the same player cannot both land.
        {
            let mut index = self.lock_index_write()?;
            if index.by_player.contains_key(&entry.player.address) {
                return Err(QueueError::AlreadyQueued {
                    address: entry.player.address.clone(),
                }
                .into());
            }
            index.insert(&entry);
        }

        let score = entry.player.joined_at.timestamp_millis();
        if let Err(e) = self.store.insert(entry.partition(), &entry, score).await {
            let mut index = self.lock_index_write()?;
            index.remove(entry.id);
            return Err(e);
        }

        {
            let mut stats = self.lock_stats_write()?;
            stats.entries_enqueued += 1;
        }
        self.metrics_collector.record_enqueue(match_type);
        debug!(
            entry_id = %entry.id,
            player = %entry.player.address,
            match_type = %match_type,
            "Enqueued entry"
        );
        Ok(entry)
    }

    /// Remove an entry at its player's request.
    ///
    /// Idempotent: cancelling an entry that was already matched, expired,
    /// or cancelled returns `Ok(false)`.
    pub async fn cancel(&self, entry_id: EntryId) -> Result<bool> {
        let indexed = {
            let index = self.lock_index_read()?;
            match index.by_entry.get(&entry_id) {
                Some(indexed) => indexed.clone(),
                None => return Ok(false),
            }
        };

        let removed = self
            .store
            .remove(indexed.match_type.partition_name(), entry_id)
            .await?;

        // Clear the index either way; a cancel that lost the race with
        // matching or expiry must not leave a stale player slot behind.
        {
            let mut index = self.lock_index_write()?;
            index.remove(entry_id);
        }
        if removed {
            let mut stats = self.lock_stats_write()?;
            stats.entries_cancelled += 1;
            drop(stats);
            self.metrics_collector.record_cancel(indexed.match_type);
            debug!(entry_id = %entry_id, "Cancelled entry");
        }
        Ok(removed)
    }

    /// Zero-based queue position of an entry within its partition.
    pub async fn position(&self, entry_id: EntryId) -> Result<Option<usize>> {
        let indexed = {
            let index = self.lock_index_read()?;
            match index.by_entry.get(&entry_id) {
                Some(indexed) => indexed.clone(),
                None => return Ok(None),
            }
        };
        self.store
            .rank(indexed.match_type.partition_name(), entry_id)
            .await
    }

    /// Status snapshot for an entry, or None if it is no longer queued.
    pub async fn status(&self, entry_id: EntryId) -> Result<Option<QueueStatus>> {
        let indexed = {
            let index = self.lock_index_read()?;
            match index.by_entry.get(&entry_id) {
                Some(indexed) => indexed.clone(),
                None => return Ok(None),
            }
        };
        let position = match self
            .store
            .rank(indexed.match_type.partition_name(), entry_id)
            .await?
        {
            Some(position) => position,
            None => return Ok(None),
        };
        let waited = current_timestamp()
            .signed_duration_since(indexed.joined_at)
            .num_seconds()
            .max(0);
        Ok(Some(QueueStatus {
            entry_id,
            match_type: indexed.match_type,
            position,
            waited_seconds: waited,
        }))
    }

    /// Look up a recently settled match by id.
    ///
    /// This is how a polling player learns their opponent after their
    /// entry left the queue. Only the most recent matches are retained;
    /// an evicted or unknown id returns None.
    pub async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchResult>> {
        let recent = self.lock_recent_read()?;
        Ok(recent
            .iter()
            .rev()
            .find(|result| result.match_id == match_id)
            .cloned())
    }

    /// Run one matching pass over every partition.
    ///
    /// Each proposed pair is extracted atomically; a pair that lost a race
    /// with a cancel or expiry is skipped and the survivors are picked up
    /// on the next pass.
    pub async fn try_match(&self) -> Result<Vec<MatchResult>> {
        let timer = self.metrics_collector.start_timer();
        let mut results = Vec::new();

        for match_type in MatchType::ALL {
            let partition = match_type.partition_name();
            let snapshot = self.store.range(partition, 0, SCAN_WINDOW - 1).await?;
            if snapshot.len() < 2 {
                continue;
            }

            let pairs = self.matcher.find_pairs(&snapshot, &self.matching_config);
            for pair in pairs {
                match self.settle_pair(partition, match_type, pair).await? {
                    Some(result) => results.push(result),
                    None => continue,
                }
            }
        }

        self.refresh_depth_metrics().await?;
        self.metrics_collector.record_match_pass(timer.stop());
        Ok(results)
    }

    /// Extract one proposed pair and publish the match.
    async fn settle_pair(
        &self,
        partition: &str,
        match_type: MatchType,
        pair: ProposedPair,
    ) -> Result<Option<MatchResult>> {
        let extracted = self
            .store
            .extract_pair((partition, pair.first.id), (partition, pair.second.id))
            .await?;
        if !extracted {
            debug!(
                first = %pair.first.id,
                second = %pair.second.id,
                "Pair lost a race, skipping"
            );
            return Ok(None);
        }

        {
            let mut index = self.lock_index_write()?;
            index.remove(pair.first.id);
            index.remove(pair.second.id);
        }

        let result = MatchResult {
            match_id: generate_match_id(),
            match_type,
            entries: vec![pair.first, pair.second],
            created_at: current_timestamp(),
        };

        self.remember_match(&result)?;
        {
            let mut stats = self.lock_stats_write()?;
            stats.matches_created += 1;
        }
        let now = current_timestamp();
        for entry in &result.entries {
            let waited = now
                .signed_duration_since(entry.player.joined_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            self.metrics_collector.record_match(match_type, waited);
        }

        info!(
            match_id = %result.match_id,
            match_type = %match_type,
            players = ?result.player_addresses(),
            "Created match"
        );
        // The match already exists; a notification failure must not undo it.
        if let Err(e) = self.notifier.notify_match_found(&result).await {
            warn!(match_id = %result.match_id, error = %e, "Failed to deliver match notification");
        }
        Ok(Some(result))
    }

    /// Accept a pending invite directly, without waiting for a matching
    /// pass.
    ///
    /// The accepting player never enters the queue; the inviter's entry is
    /// removed and a match is produced immediately. Fails if the inviter's
    /// entry is gone or was not addressed to this player.
    pub async fn accept_invite(
        &self,
        inviter_entry_id: EntryId,
        player: Player,
    ) -> Result<Option<MatchResult>> {
        let partition = MatchType::Invite.partition_name();
        let inviter = match self.find_entry(partition, inviter_entry_id).await? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if inviter.invite_address.as_deref() != Some(player.address.as_str()) {
            return Err(QueueError::Validation {
                reason: format!(
                    "Invite {} is not addressed to player {}",
                    inviter_entry_id, player.address
                ),
            }
            .into());
        }

        // Lost a race with cancel, expiry, or a concurrent accept.
        if !self.store.remove(partition, inviter_entry_id).await? {
            return Ok(None);
        }
        {
            let mut index = self.lock_index_write()?;
            index.remove(inviter_entry_id);
        }

        // The acceptor gets a synthetic reciprocal entry so the match
        // result carries both sides in the usual shape.
        let acceptor = QueueEntry {
            id: generate_entry_id(),
            invite_address: Some(inviter.player.address.clone()),
            player,
            match_type: MatchType::Invite,
            max_elo_diff: None,
        };
        acceptor.validate()?;

        let waited = current_timestamp()
            .signed_duration_since(inviter.player.joined_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let result = MatchResult {
            match_id: generate_match_id(),
            match_type: MatchType::Invite,
            entries: vec![inviter, acceptor],
            created_at: current_timestamp(),
        };

        self.remember_match(&result)?;
        {
            let mut stats = self.lock_stats_write()?;
            stats.matches_created += 1;
            stats.invites_accepted += 1;
        }
        self.metrics_collector
            .record_match(MatchType::Invite, waited);
        self.refresh_depth_metrics().await?;

        info!(
            match_id = %result.match_id,
            players = ?result.player_addresses(),
            "Invite accepted"
        );
        if let Err(e) = self.notifier.notify_match_found(&result).await {
            warn!(match_id = %result.match_id, error = %e, "Failed to deliver match notification");
        }
        Ok(Some(result))
    }

    /// Drop expired entries from every partition and notify their players.
    ///
    /// Returns the number of entries dropped.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let timer = self.metrics_collector.start_timer();
        let now = current_timestamp();
        let mut dropped = 0usize;

        for match_type in MatchType::ALL {
            let purged = self
                .store
                .purge_expired(match_type.partition_name(), now)
                .await?;
            if purged.is_empty() {
                continue;
            }

            {
                let mut index = self.lock_index_write()?;
                for entry in &purged {
                    index.remove(entry.id);
                }
            }
            {
                let mut stats = self.lock_stats_write()?;
                stats.entries_expired += purged.len() as u64;
            }

            for entry in &purged {
                self.metrics_collector.record_expiry(match_type);
                if let Err(e) = self.notifier.notify_entry_expired(entry).await {
                    warn!(entry_id = %entry.id, error = %e, "Failed to deliver expiry notification");
                }
            }
            dropped += purged.len();
        }

        if dropped > 0 {
            info!(entries = dropped, "Expired queue entries");
            self.refresh_depth_metrics().await?;
        }
        self.metrics_collector.record_expiry_sweep(timer.stop());
        Ok(dropped)
    }

    /// Change the TTL a partition applies to future inserts.
    pub async fn set_partition_ttl(&self, match_type: MatchType, ttl: Duration) -> Result<()> {
        self.store
            .set_ttl(match_type.partition_name(), ttl)
            .await
    }

    /// Number of entries waiting in one partition.
    pub async fn queue_size(&self, match_type: MatchType) -> Result<usize> {
        self.store.size(match_type.partition_name()).await
    }

    /// Current coordinator statistics
    pub async fn get_stats(&self) -> Result<QueueCoordinatorStats> {
        let mut stats = {
            let stats = self.lock_stats_read()?;
            stats.clone()
        };
        let mut waiting = 0usize;
        for match_type in MatchType::ALL {
            waiting += self.store.size(match_type.partition_name()).await?;
        }
        stats.entries_waiting = waiting;
        Ok(stats)
    }

    /// Force buffered store state to disk.
    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    async fn find_entry(&self, partition: &str, entry_id: EntryId) -> Result<Option<QueueEntry>> {
        let entries: Vec<ScoredEntry> = self.store.range(partition, 0, SCAN_WINDOW - 1).await?;
        Ok(entries
            .into_iter()
            .map(|scored| scored.entry)
            .find(|entry| entry.id == entry_id))
    }

    async fn refresh_depth_metrics(&self) -> Result<()> {
        for match_type in MatchType::ALL {
            let depth = self.store.size(match_type.partition_name()).await?;
            self.metrics_collector.set_queue_depth(match_type, depth);
        }
        Ok(())
    }

    fn remember_match(&self, result: &MatchResult) -> Result<()> {
        let mut recent = self.lock_recent_write()?;
        if recent.len() == MATCH_HISTORY_LIMIT {
            recent.pop_front();
        }
        recent.push_back(result.clone());
        Ok(())
    }

    fn lock_recent_read(&self) -> Result<std::sync::RwLockReadGuard<'_, VecDeque<MatchResult>>> {
        self.recent_matches.read().map_err(|_| {
            QueueError::Internal {
                message: "Failed to acquire match history lock".to_string(),
            }
            .into()
        })
    }

    fn lock_recent_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, VecDeque<MatchResult>>> {
        self.recent_matches.write().map_err(|_| {
            QueueError::Internal {
                message: "Failed to acquire match history lock".to_string(),
            }
            .into()
        })
    }

    fn lock_index_read(&self) -> Result<std::sync::RwLockReadGuard<'_, EntryIndex>> {
        self.index.read().map_err(|_| {
            QueueError::Internal {
                message: "Failed to acquire index lock".to_string(),
            }
            .into()
        })
    }

    fn lock_index_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, EntryIndex>> {
        self.index.write().map_err(|_| {
            QueueError::Internal {
                message: "Failed to acquire index lock".to_string(),
            }
            .into()
        })
    }

    fn lock_stats_read(&self) -> Result<std::sync::RwLockReadGuard<'_, QueueCoordinatorStats>> {
        self.stats.read().map_err(|_| {
            QueueError::Internal {
                message: "Failed to acquire stats lock".to_string(),
            }
            .into()
        })
    }

    fn lock_stats_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, QueueCoordinatorStats>> {
        self.stats.write().map_err(|_| {
            QueueError::Internal {
                message: "Failed to acquire stats lock".to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MockNotifier;
    use crate::store::MemoryStore;

    fn player(address: &str, elo: u32) -> Player {
        Player {
            address: address.to_string(),
            elo,
            joined_at: current_timestamp(),
        }
    }

    fn create_test_coordinator() -> (QueueCoordinator, Arc<MockNotifier>) {
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(MockNotifier::new());
        let coordinator = QueueCoordinator::new(store, notifier.clone()).unwrap();
        (coordinator, notifier)
    }

    #[tokio::test]
    async fn test_enqueue_and_position() {
        let (coordinator, _) = create_test_coordinator();

        let a = coordinator
            .enqueue(player("a", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();
        let b = coordinator
            .enqueue(player("b", 1600), MatchType::Casual, None, None)
            .await
            .unwrap();

        assert_eq!(coordinator.position(a.id).await.unwrap(), Some(0));
        assert_eq!(coordinator.position(b.id).await.unwrap(), Some(1));

        let status = coordinator.status(b.id).await.unwrap().unwrap();
        assert_eq!(status.match_type, MatchType::Casual);
        assert_eq!(status.position, 1);
    }

    #[tokio::test]
    async fn test_one_live_entry_per_player() {
        let (coordinator, _) = create_test_coordinator();

        coordinator
            .enqueue(player("a", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();
        let err = coordinator
            .enqueue(player("a", 1500), MatchType::Rated, None, Some(100))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QueueError>().unwrap(),
            QueueError::AlreadyQueued { .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_entry_rejected() {
        let (coordinator, _) = create_test_coordinator();

        // Casual entries carry no invite target.
        let err = coordinator
            .enqueue(
                player("a", 1500),
                MatchType::Casual,
                Some("b".to_string()),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QueueError>().unwrap(),
            QueueError::Validation { .. }
        ));
        assert_eq!(coordinator.queue_size(MatchType::Casual).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_frees_player() {
        let (coordinator, _) = create_test_coordinator();

        let a = coordinator
            .enqueue(player("a", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();
        assert!(coordinator.cancel(a.id).await.unwrap());
        assert!(!coordinator.cancel(a.id).await.unwrap());

        // The player can rejoin after cancelling.
        coordinator
            .enqueue(player("a", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_try_match_pairs_casual_players() {
        let (coordinator, notifier) = create_test_coordinator();

        coordinator
            .enqueue(player("a", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();
        coordinator
            .enqueue(player("b", 1900), MatchType::Casual, None, None)
            .await
            .unwrap();

        let results = coordinator.try_match().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::Casual);
        assert_eq!(coordinator.queue_size(MatchType::Casual).await.unwrap(), 0);
        assert_eq!(notifier.get_matches().len(), 1);

        // Both players are free to queue again.
        coordinator
            .enqueue(player("a", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();
        coordinator
            .enqueue(player("b", 1900), MatchType::Rated, None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_try_match_respects_elo_bounds() {
        let (coordinator, _) = create_test_coordinator();

        coordinator
            .enqueue(player("a", 1500), MatchType::Rated, None, Some(100))
            .await
            .unwrap();
        coordinator
            .enqueue(player("b", 1900), MatchType::Rated, None, Some(100))
            .await
            .unwrap();

        let results = coordinator.try_match().await.unwrap();
        assert!(results.is_empty());
        assert_eq!(coordinator.queue_size(MatchType::Rated).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_try_match_pairs_unbounded_rated_players() {
        let (coordinator, _) = create_test_coordinator();

        // Neither player set a bound, so even a large gap pairs.
        coordinator
            .enqueue(player("novice", 1200), MatchType::Rated, None, None)
            .await
            .unwrap();
        coordinator
            .enqueue(player("master", 2400), MatchType::Rated, None, None)
            .await
            .unwrap();

        let results = coordinator.try_match().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(coordinator.queue_size(MatchType::Rated).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_match_returns_settled_match() {
        let (coordinator, _) = create_test_coordinator();

        coordinator
            .enqueue(player("a", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();
        coordinator
            .enqueue(player("b", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();

        let results = coordinator.try_match().await.unwrap();
        assert_eq!(results.len(), 1);

        let found = coordinator
            .get_match(results[0].match_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.match_id, results[0].match_id);
        assert_eq!(found.entries.len(), 2);

        let unknown = coordinator.get_match(generate_match_id()).await.unwrap();
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_match_types_never_mix() {
        let (coordinator, _) = create_test_coordinator();

        coordinator
            .enqueue(player("a", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();
        coordinator
            .enqueue(player("b", 1500), MatchType::Rated, None, Some(500))
            .await
            .unwrap();

        let results = coordinator.try_match().await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_mutual_invites_match() {
        let (coordinator, _) = create_test_coordinator();

        coordinator
            .enqueue(
                player("a", 1500),
                MatchType::Invite,
                Some("b".to_string()),
                None,
            )
            .await
            .unwrap();
        coordinator
            .enqueue(
                player("b", 2100),
                MatchType::Invite,
                Some("a".to_string()),
                None,
            )
            .await
            .unwrap();

        let results = coordinator.try_match().await.unwrap();
        assert_eq!(results.len(), 1);
        let mut addresses = results[0].player_addresses();
        addresses.sort();
        assert_eq!(addresses, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_accept_invite_produces_immediate_match() {
        let (coordinator, notifier) = create_test_coordinator();

        let invite = coordinator
            .enqueue(
                player("a", 1500),
                MatchType::Invite,
                Some("b".to_string()),
                None,
            )
            .await
            .unwrap();

        let result = coordinator
            .accept_invite(invite.id, player("b", 1700))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.match_type, MatchType::Invite);
        assert_eq!(result.entries.len(), 2);
        assert_eq!(coordinator.queue_size(MatchType::Invite).await.unwrap(), 0);
        assert_eq!(notifier.get_matches().len(), 1);
        assert!(coordinator
            .get_match(result.match_id)
            .await
            .unwrap()
            .is_some());

        let stats = coordinator.get_stats().await.unwrap();
        assert_eq!(stats.invites_accepted, 1);
    }

    #[tokio::test]
    async fn test_accept_invite_wrong_player_rejected() {
        let (coordinator, _) = create_test_coordinator();

        let invite = coordinator
            .enqueue(
                player("a", 1500),
                MatchType::Invite,
                Some("b".to_string()),
                None,
            )
            .await
            .unwrap();

        let err = coordinator
            .accept_invite(invite.id, player("mallory", 1700))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QueueError>().unwrap(),
            QueueError::Validation { .. }
        ));
        // The invite stays queued.
        assert_eq!(coordinator.queue_size(MatchType::Invite).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_accept_invite_gone_entry() {
        let (coordinator, _) = create_test_coordinator();

        let invite = coordinator
            .enqueue(
                player("a", 1500),
                MatchType::Invite,
                Some("b".to_string()),
                None,
            )
            .await
            .unwrap();
        coordinator.cancel(invite.id).await.unwrap();

        let result = coordinator
            .accept_invite(invite.id, player("b", 1700))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_sweep_expired_notifies_and_frees_players() {
        use crate::store::{StoreConfig, TtlPolicy};

        let store = Arc::new(MemoryStore::new(StoreConfig {
            default_ttl: Duration::ZERO,
            ttl_policy: TtlPolicy::PerEntry,
        }));
        let notifier = Arc::new(MockNotifier::new());
        let coordinator = QueueCoordinator::new(store, notifier.clone()).unwrap();

        coordinator
            .enqueue(player("a", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();

        let dropped = coordinator.sweep_expired().await.unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(notifier.get_expirations().len(), 1);
        assert_eq!(coordinator.queue_size(MatchType::Casual).await.unwrap(), 0);

        // Expiry released the player slot.
        coordinator
            .enqueue(player("a", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_recover_rebuilds_index() {
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(MockNotifier::new());
        let coordinator = QueueCoordinator::new(store.clone(), notifier.clone()).unwrap();
        let a = coordinator
            .enqueue(player("a", 1500), MatchType::Rated, None, Some(200))
            .await
            .unwrap();

        // A second coordinator over the same store starts cold, then
        // recovers the live entry.
        let fresh = QueueCoordinator::new(store, Arc::new(MockNotifier::new())).unwrap();
        assert_eq!(fresh.position(a.id).await.unwrap(), None);
        assert_eq!(fresh.recover().await.unwrap(), 1);
        assert_eq!(fresh.position(a.id).await.unwrap(), Some(0));

        let err = fresh
            .enqueue(player("a", 1500), MatchType::Casual, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QueueError>().unwrap(),
            QueueError::AlreadyQueued { .. }
        ));
    }

    #[tokio::test]
    async fn test_stats_tracking() {
        let (coordinator, _) = create_test_coordinator();

        coordinator
            .enqueue(player("a", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();
        coordinator
            .enqueue(player("b", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();
        let c = coordinator
            .enqueue(player("c", 1500), MatchType::Casual, None, None)
            .await
            .unwrap();

        coordinator.try_match().await.unwrap();
        coordinator.cancel(c.id).await.unwrap();

        let stats = coordinator.get_stats().await.unwrap();
        assert_eq!(stats.entries_enqueued, 3);
        assert_eq!(stats.matches_created, 1);
        assert_eq!(stats.entries_cancelled, 1);
        assert_eq!(stats.entries_waiting, 0);
    }
}
