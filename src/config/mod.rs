//! Configuration management for the waiting-room service
//!
//! Handles configuration loading from files and environment variables,
//! validation, and default values.

pub mod app;

pub use app::{
    validate_config, AppConfig, MatchmakingSettings, ServiceSettings, StorageSettings,
};
