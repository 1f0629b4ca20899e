//! Matching algorithms for pairing queued entries
//!
//! The matcher is a pure function over a snapshot of a partition: it never
//! touches the store. The coordinator feeds it entries in queue order and
//! then removes each proposed pair atomically, so a pair that raced with a
//! cancel simply fails extraction and is retried on the next pass.

use crate::store::ScoredEntry;
use crate::types::{MatchType, QueueEntry};
use crate::utils::{elo_difference, within_elo_bound};

/// Configuration for matching behavior
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Cap on pairs proposed in a single pass over one partition
    pub max_pairs_per_pass: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_pairs_per_pass: 64,
        }
    }
}

/// A pair the matcher wants to extract from the queue
#[derive(Debug, Clone)]
pub struct ProposedPair {
    pub first: QueueEntry,
    pub second: QueueEntry,
}

/// Trait for pair matching algorithms
pub trait PairMatcher: Send + Sync {
    /// Propose pairs from a partition snapshot, oldest entries first.
    ///
    /// `entries` must already be in queue order (ascending score).
    fn find_pairs(&self, entries: &[ScoredEntry], config: &MatchingConfig) -> Vec<ProposedPair>;

    /// Check whether two entries may be paired at all
    fn is_compatible(&self, a: &QueueEntry, b: &QueueEntry) -> bool;
}

/// Default matcher: oldest waiting entry first, best candidate wins
///
/// Compatibility rules per match type:
/// - Casual: any two entries pair
/// - Rated: the elo gap must satisfy both entries' bounds; an entry that
///   set no bound accepts any gap
/// - Invite: each entry must name the other's player
///
/// Among compatible candidates the closest elo wins, with the longer wait
/// breaking ties.
#[derive(Debug, Default)]
pub struct CompatibilityMatcher;

impl CompatibilityMatcher {
    pub fn new() -> Self {
        Self
    }

    fn rated_compatible(&self, a: &QueueEntry, b: &QueueEntry) -> bool {
        within_elo_bound(a.player.elo, b.player.elo, a.max_elo_diff)
            && within_elo_bound(a.player.elo, b.player.elo, b.max_elo_diff)
    }

    fn invite_compatible(&self, a: &QueueEntry, b: &QueueEntry) -> bool {
        a.invite_address.as_deref() == Some(b.player.address.as_str())
            && b.invite_address.as_deref() == Some(a.player.address.as_str())
    }
}

impl PairMatcher for CompatibilityMatcher {
    fn find_pairs(&self, entries: &[ScoredEntry], config: &MatchingConfig) -> Vec<ProposedPair> {
        let mut pairs = Vec::new();
        let mut taken = vec![false; entries.len()];

        for i in 0..entries.len() {
            if pairs.len() >= config.max_pairs_per_pass {
                break;
            }
            if taken[i] {
                continue;
            }

            let anchor = &entries[i].entry;
            let mut best: Option<(usize, u32)> = None;
            for (j, candidate) in entries.iter().enumerate().skip(i + 1) {
                if taken[j] {
                    continue;
                }
                if !self.is_compatible(anchor, &candidate.entry) {
                    continue;
                }
                let diff = elo_difference(anchor.player.elo, candidate.entry.player.elo);
                // Strict comparison keeps the earliest candidate on equal
                // elo distance.
                match best {
                    Some((_, best_diff)) if diff >= best_diff => {}
                    _ => best = Some((j, diff)),
                }
            }

            if let Some((j, _)) = best {
                taken[i] = true;
                taken[j] = true;
                pairs.push(ProposedPair {
                    first: anchor.clone(),
                    second: entries[j].entry.clone(),
                });
            }
        }

        pairs
    }

    fn is_compatible(&self, a: &QueueEntry, b: &QueueEntry) -> bool {
        if a.match_type != b.match_type || a.player.address == b.player.address {
            return false;
        }
        match a.match_type {
            MatchType::Casual => true,
            MatchType::Rated => self.rated_compatible(a, b),
            MatchType::Invite => self.invite_compatible(a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Player;
    use crate::utils::{current_timestamp, generate_entry_id};

    fn rated(address: &str, elo: u32, bound: Option<u32>) -> ScoredEntry {
        scored(QueueEntry {
            id: generate_entry_id(),
            player: Player {
                address: address.to_string(),
                elo,
                joined_at: current_timestamp(),
            },
            match_type: MatchType::Rated,
            invite_address: None,
            max_elo_diff: bound,
        })
    }

    fn casual(address: &str, elo: u32) -> ScoredEntry {
        scored(QueueEntry {
            id: generate_entry_id(),
            player: Player {
                address: address.to_string(),
                elo,
                joined_at: current_timestamp(),
            },
            match_type: MatchType::Casual,
            invite_address: None,
            max_elo_diff: None,
        })
    }

    fn invite(address: &str, target: &str) -> ScoredEntry {
        scored(QueueEntry {
            id: generate_entry_id(),
            player: Player {
                address: address.to_string(),
                elo: 1500,
                joined_at: current_timestamp(),
            },
            match_type: MatchType::Invite,
            invite_address: Some(target.to_string()),
            max_elo_diff: None,
        })
    }

    fn scored(entry: QueueEntry) -> ScoredEntry {
        ScoredEntry { entry, score: 0 }
    }

    fn addresses(pair: &ProposedPair) -> (String, String) {
        (
            pair.first.player.address.clone(),
            pair.second.player.address.clone(),
        )
    }

    #[test]
    fn test_casual_pairs_in_arrival_order() {
        let matcher = CompatibilityMatcher::new();
        let entries = vec![
            casual("a", 800),
            casual("b", 2400),
            casual("c", 1500),
            casual("d", 1501),
        ];

        let pairs = matcher.find_pairs(&entries, &MatchingConfig::default());
        assert_eq!(pairs.len(), 2);
        // The oldest entry anchors the first pair and takes its closest
        // elo, then the remaining two pair up.
        assert_eq!(addresses(&pairs[0]), ("a".to_string(), "c".to_string()));
        assert_eq!(addresses(&pairs[1]), ("b".to_string(), "d".to_string()));
    }

    #[test]
    fn test_rated_respects_both_bounds() {
        let matcher = CompatibilityMatcher::new();

        let a = rated("a", 1500, Some(300));
        let b = rated("b", 1700, Some(100));
        // Within a's bound but outside b's.
        assert!(!matcher.is_compatible(&a.entry, &b.entry));

        let c = rated("c", 1750, Some(100));
        assert!(matcher.is_compatible(&b.entry, &c.entry));
    }

    #[test]
    fn test_rated_unset_bound_is_unconstrained() {
        let matcher = CompatibilityMatcher::new();

        // Neither player constrained the gap, so any distance pairs.
        let novice = rated("novice", 1200, None);
        let master = rated("master", 2400, None);
        assert!(matcher.is_compatible(&novice.entry, &master.entry));

        let pairs = matcher.find_pairs(&[novice, master], &MatchingConfig::default());
        assert_eq!(pairs.len(), 1);

        // One side's bound still applies on its own.
        let picky = rated("picky", 2400, Some(100));
        let open = rated("open", 1200, None);
        assert!(!matcher.is_compatible(&open.entry, &picky.entry));
    }

    #[test]
    fn test_oldest_unmatched_entry_is_skipped_not_blocking() {
        let matcher = CompatibilityMatcher::new();
        let entries = vec![
            rated("stranded", 3000, Some(50)),
            rated("a", 1500, Some(200)),
            rated("b", 1520, Some(200)),
        ];

        let pairs = matcher.find_pairs(&entries, &MatchingConfig::default());
        assert_eq!(pairs.len(), 1);
        assert_eq!(addresses(&pairs[0]), ("a".to_string(), "b".to_string()));
    }

    #[test]
    fn test_closest_elo_wins_then_earliest() {
        let matcher = CompatibilityMatcher::new();
        let entries = vec![
            rated("anchor", 1500, Some(200)),
            rated("far", 1650, Some(200)),
            rated("near", 1510, Some(200)),
            rated("near_later", 1510, Some(200)),
        ];

        let pairs = matcher.find_pairs(&entries, &MatchingConfig::default());
        assert_eq!(addresses(&pairs[0]), ("anchor".to_string(), "near".to_string()));
        // Equal distance falls back to queue order.
        assert_eq!(
            addresses(&pairs[1]),
            ("far".to_string(), "near_later".to_string())
        );
    }

    #[test]
    fn test_invite_requires_mutual_targets() {
        let matcher = CompatibilityMatcher::new();

        let a = invite("a", "b");
        let b = invite("b", "a");
        let c = invite("c", "a");
        assert!(matcher.is_compatible(&a.entry, &b.entry));
        // c targets a, but a targets b.
        assert!(!matcher.is_compatible(&a.entry, &c.entry));
    }

    #[test]
    fn test_never_pairs_same_player() {
        let matcher = CompatibilityMatcher::new();
        let a = casual("a", 1500);
        let also_a = casual("a", 1500);
        assert!(!matcher.is_compatible(&a.entry, &also_a.entry));
    }

    #[test]
    fn test_max_pairs_per_pass() {
        let matcher = CompatibilityMatcher::new();
        let config = MatchingConfig {
            max_pairs_per_pass: 1,
        };
        let entries = vec![
            casual("a", 1500),
            casual("b", 1500),
            casual("c", 1500),
            casual("d", 1500),
        ];
        let pairs = matcher.find_pairs(&entries, &config);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_empty_and_singleton_snapshots() {
        let matcher = CompatibilityMatcher::new();
        let config = MatchingConfig::default();
        assert!(matcher.find_pairs(&[], &config).is_empty());
        assert!(matcher.find_pairs(&[casual("a", 1500)], &config).is_empty());
    }
}
