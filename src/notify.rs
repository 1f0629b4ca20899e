//! Outbound notifications for queue outcomes

use crate::error::Result;
use crate::types::{MatchResult, QueueEntry};
use async_trait::async_trait;
use tracing::info;

/// Trait for delivering queue outcomes to interested parties
#[async_trait]
pub trait MatchNotifier: Send + Sync {
    /// A pair was formed and removed from the queue
    async fn notify_match_found(&self, result: &MatchResult) -> Result<()>;

    /// An entry expired before it could be matched
    async fn notify_entry_expired(&self, entry: &QueueEntry) -> Result<()>;
}

/// Notifier that records outcomes to the structured log
///
/// Useful as the default sink when no downstream consumer is wired up.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MatchNotifier for LogNotifier {
    async fn notify_match_found(&self, result: &MatchResult) -> Result<()> {
        info!(
            match_id = %result.match_id,
            match_type = %result.match_type,
            players = ?result.player_addresses(),
            "Match found"
        );
        Ok(())
    }

    async fn notify_entry_expired(&self, entry: &QueueEntry) -> Result<()> {
        info!(
            entry_id = %entry.id,
            match_type = %entry.match_type,
            player = %entry.player.address,
            "Entry expired without a match"
        );
        Ok(())
    }
}

/// Mock notifier for testing
#[derive(Debug, Default)]
pub struct MockNotifier {
    matches: std::sync::Mutex<Vec<MatchResult>>,
    expirations: std::sync::Mutex<Vec<QueueEntry>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches delivered so far (for testing)
    pub fn get_matches(&self) -> Vec<MatchResult> {
        self.matches
            .lock()
            .map(|matches| matches.clone())
            .unwrap_or_default()
    }

    /// Expired entries delivered so far (for testing)
    pub fn get_expirations(&self) -> Vec<QueueEntry> {
        self.expirations
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut matches) = self.matches.lock() {
            matches.clear();
        }
        if let Ok(mut expirations) = self.expirations.lock() {
            expirations.clear();
        }
    }
}

#[async_trait]
impl MatchNotifier for MockNotifier {
    async fn notify_match_found(&self, result: &MatchResult) -> Result<()> {
        if let Ok(mut matches) = self.matches.lock() {
            matches.push(result.clone());
        }
        Ok(())
    }

    async fn notify_entry_expired(&self, entry: &QueueEntry) -> Result<()> {
        if let Ok(mut expirations) = self.expirations.lock() {
            expirations.push(entry.clone());
        }
        Ok(())
    }
}
