//! Waiting Room - persistent matchmaking queue service
//!
//! This crate provides a durable, score-ordered matchmaking queue with
//! casual, rated, and invite pairing, journal-backed persistence, and
//! periodic expiry of stale entries.

pub mod codec;
pub mod config;
pub mod error;
pub mod expiry;
pub mod matching;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{QueueError, Result};
pub use types::*;

// Re-export key components
pub use matching::{CompatibilityMatcher, MatchingConfig, PairMatcher};
pub use notify::{LogNotifier, MatchNotifier};
pub use queue::QueueCoordinator;
pub use store::{DurableStore, MemoryStore, OrderedStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
