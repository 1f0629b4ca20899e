//! Service layer for the waiting-room queue service
//!
//! Contains the main application state, background task management, and
//! health checks for the production service.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus};
