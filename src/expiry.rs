//! Periodic expiry sweeps
//!
//! Runs the coordinator's expiry sweep on an interval. Errors are logged
//! and the loop keeps running; one failed sweep must not stop expiry for
//! the rest of the process lifetime.

use crate::queue::QueueCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};

pub struct ExpiryManager {
    coordinator: Arc<QueueCoordinator>,
    sweep_interval: Duration,
    is_running: Arc<RwLock<bool>>,
}

impl ExpiryManager {
    pub fn new(coordinator: Arc<QueueCoordinator>, sweep_interval: Duration) -> Self {
        Self {
            coordinator,
            sweep_interval,
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// Run a single sweep immediately.
    pub async fn sweep_once(&self) -> crate::error::Result<usize> {
        self.coordinator.sweep_expired().await
    }

    /// Start the periodic sweep task.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(&self);

        tokio::spawn(async move {
            *manager.is_running.write().await = true;
            let mut sweep_interval = interval(manager.sweep_interval);
            info!(
                interval_secs = manager.sweep_interval.as_secs(),
                "Expiry sweep task started"
            );

            while *manager.is_running.read().await {
                sweep_interval.tick().await;

                match manager.coordinator.sweep_expired().await {
                    Ok(0) => debug!("Expiry sweep found nothing to drop"),
                    Ok(dropped) => info!(entries = dropped, "Expiry sweep dropped entries"),
                    Err(e) => error!("Expiry sweep failed: {}", e),
                }
            }

            info!("Expiry sweep task stopped");
        })
    }

    /// Ask the sweep task to stop after its current tick.
    pub async fn stop(&self) {
        *self.is_running.write().await = false;
    }
}
