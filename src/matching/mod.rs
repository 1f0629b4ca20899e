//! Pair matching over queued entries

pub mod engine;

pub use engine::{CompatibilityMatcher, MatchingConfig, PairMatcher, ProposedPair};
