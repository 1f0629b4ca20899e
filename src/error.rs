//! Error types for the matchmaking queue
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific queue scenarios
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Invalid enqueue request: {reason}")]
    Validation { reason: String },

    #[error("Entry already exists: {entry_id}")]
    DuplicateEntry { entry_id: String },

    #[error("Player already queued: {address}")]
    AlreadyQueued { address: String },

    #[error("Corrupt queue record: {reason}")]
    Codec { reason: String },

    #[error("Queue store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal queue error: {message}")]
    Internal { message: String },
}
