//! Utility functions for the matchmaking queue

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique queue entry ID
pub fn generate_entry_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique match ID
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Calculate the absolute difference between two elo ratings
pub fn elo_difference(elo1: u32, elo2: u32) -> u32 {
    elo1.abs_diff(elo2)
}

/// Check if two ratings are within the given bound; `None` means unconstrained
pub fn within_elo_bound(elo1: u32, elo2: u32, bound: Option<u32>) -> bool {
    match bound {
        Some(max) => elo_difference(elo1, elo2) <= max,
        None => true,
    }
}
