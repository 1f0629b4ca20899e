//! Common types used throughout the matchmaking queue

use crate::error::{QueueError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque wallet/account address identifying a player
pub type PlayerAddress = String;

/// Unique identifier for queue entries
pub type EntryId = Uuid;

/// Unique identifier for formed matches
pub type MatchId = Uuid;

/// Kind of pairing a player is queueing for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    Casual,
    Rated,
    Invite,
}

impl MatchType {
    /// All match types, in partition iteration order.
    pub const ALL: [MatchType; 3] = [MatchType::Casual, MatchType::Rated, MatchType::Invite];

    /// Name of the durable partition holding entries of this type.
    pub fn partition_name(&self) -> &'static str {
        match self {
            MatchType::Casual => "queue:casual",
            MatchType::Rated => "queue:rated",
            MatchType::Invite => "queue:invite",
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchType::Casual => write!(f, "Casual"),
            MatchType::Rated => write!(f, "Rated"),
            MatchType::Invite => write!(f, "Invite"),
        }
    }
}

/// Player identity and rating at enqueue time. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub address: PlayerAddress,
    pub elo: u32,
    pub joined_at: DateTime<Utc>,
}

/// A single waiting slot in a partition.
///
/// Invariant: `invite_address` is set iff `match_type == Invite`, and
/// `max_elo_diff` may only be set when `match_type == Rated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub player: Player,
    pub match_type: MatchType,
    pub invite_address: Option<PlayerAddress>,
    pub max_elo_diff: Option<u32>,
}

impl QueueEntry {
    /// Check the match-type/optional-field invariant.
    pub fn validate(&self) -> Result<()> {
        match self.match_type {
            MatchType::Invite => {
                if self.invite_address.is_none() {
                    return Err(QueueError::Validation {
                        reason: "Invite entries must carry an invite_address".to_string(),
                    }
                    .into());
                }
                if self.max_elo_diff.is_some() {
                    return Err(QueueError::Validation {
                        reason: "Invite entries cannot carry max_elo_diff".to_string(),
                    }
                    .into());
                }
            }
            MatchType::Rated => {
                if self.invite_address.is_some() {
                    return Err(QueueError::Validation {
                        reason: "Rated entries cannot carry an invite_address".to_string(),
                    }
                    .into());
                }
            }
            MatchType::Casual => {
                if self.invite_address.is_some() {
                    return Err(QueueError::Validation {
                        reason: "Casual entries cannot carry an invite_address".to_string(),
                    }
                    .into());
                }
                if self.max_elo_diff.is_some() {
                    return Err(QueueError::Validation {
                        reason: "Casual entries cannot carry max_elo_diff".to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Partition this entry belongs to.
    pub fn partition(&self) -> &'static str {
        self.match_type.partition_name()
    }
}

/// A formed pair, emitted by the matching engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub match_id: MatchId,
    pub match_type: MatchType,
    pub entries: Vec<QueueEntry>,
    pub created_at: DateTime<Utc>,
}

impl MatchResult {
    /// Addresses of the paired players.
    pub fn player_addresses(&self) -> Vec<PlayerAddress> {
        self.entries
            .iter()
            .map(|e| e.player.address.clone())
            .collect()
    }
}

/// Snapshot of a waiting entry's standing, for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub entry_id: EntryId,
    pub match_type: MatchType,
    /// 0-based rank within the partition by score order.
    pub position: usize,
    /// How long the entry has been waiting.
    pub waited_seconds: i64,
}
