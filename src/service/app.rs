//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the durable
//! store, coordinator, and background tasks together.

use crate::config::AppConfig;
use crate::expiry::ExpiryManager;
use crate::matching::CompatibilityMatcher;
use crate::metrics::MetricsCollector;
use crate::notify::{LogNotifier, MatchNotifier};
use crate::queue::QueueCoordinator;
use crate::store::DurableStore;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Durable store, held directly for compaction and final flush
    store: Arc<DurableStore>,

    /// Queue coordinator
    coordinator: Arc<QueueCoordinator>,

    /// Expiry manager
    expiry_manager: Arc<ExpiryManager>,

    /// Metrics collector
    metrics_collector: Arc<MetricsCollector>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    /// Process start time for uptime reporting
    started_at: Instant,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing waiting-room queue service");
        info!(
            "Configuration: service={}, data_dir={}",
            config.service.name,
            config.storage.data_dir.display()
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let store = Arc::new(
            DurableStore::open(
                config.store_config(),
                config.journal_path(),
                config.fsync_policy(),
            )
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to open durable store: {}", e),
            })?,
        );

        let notifier: Arc<dyn MatchNotifier> = Arc::new(LogNotifier::new());
        let coordinator = Arc::new(
            QueueCoordinator::with_matcher_and_metrics(
                store.clone(),
                notifier,
                Arc::new(CompatibilityMatcher::new()),
                config.matching_config(),
                metrics_collector.clone(),
            )
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create coordinator: {}", e),
            })?,
        );

        let recovered =
            coordinator
                .recover()
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to recover queue index: {}", e),
                })?;
        if recovered > 0 {
            info!(entries = recovered, "Recovered live entries from journal");
        }

        let expiry_manager = Arc::new(ExpiryManager::new(
            coordinator.clone(),
            config.expiry_sweep_interval(),
        ));

        Ok(Self {
            config,
            store,
            coordinator,
            expiry_manager,
            metrics_collector,
            background_tasks: Vec::new(),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Start all background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting waiting-room queue service");

        *self.is_running.write().await = true;

        self.start_matching_task();
        self.start_compaction_task();
        self.start_uptime_task();
        self.background_tasks
            .push(self.expiry_manager.clone().start());

        info!("✅ Waiting-room queue service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of waiting-room service");

        *self.is_running.write().await = false;
        self.expiry_manager.stop().await;

        for task in self.background_tasks.drain(..) {
            task.abort();
        }

        // Make sure everything buffered reaches the journal before exit.
        if let Err(e) = self.coordinator.flush().await {
            warn!("Failed to flush store during shutdown: {}", e);
        }

        let final_stats = self.coordinator.get_stats().await.map_err(|e| {
            ServiceError::BackgroundTask {
                message: format!("Failed to get final stats: {}", e),
            }
        })?;
        info!("Final service statistics: {:?}", final_stats);
        info!("✅ Waiting-room service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get the queue coordinator for operations
    pub fn coordinator(&self) -> Arc<QueueCoordinator> {
        self.coordinator.clone()
    }

    /// Get the metrics collector
    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Process uptime
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Start the periodic matching task
    fn start_matching_task(&mut self) {
        let coordinator = self.coordinator.clone();
        let match_interval = self.config.match_interval();
        let is_running = self.is_running.clone();

        info!(
            "Starting matching task ({}ms interval)...",
            match_interval.as_millis()
        );
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(match_interval);
            info!("Matching task started");

            while *is_running.read().await {
                interval.tick().await;

                match coordinator.try_match().await {
                    Ok(results) if !results.is_empty() => {
                        info!(matches = results.len(), "Matching pass created matches");
                    }
                    Ok(_) => debug!("Matching pass found no pairs"),
                    Err(e) => error!("Matching pass failed: {}", e),
                }
            }

            info!("Matching task stopped");
        });
        self.background_tasks.push(task);
    }

    /// Start the periodic journal compaction task
    fn start_compaction_task(&mut self) {
        let store = self.store.clone();
        let metrics_collector = self.metrics_collector.clone();
        let compaction_interval = self.config.compaction_interval();
        let is_running = self.is_running.clone();

        info!(
            "Starting compaction task ({}s interval)...",
            compaction_interval.as_secs()
        );
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(compaction_interval);
            info!("Compaction task started");

            while *is_running.read().await {
                interval.tick().await;

                match store.compact() {
                    Ok(()) => metrics_collector.record_compaction(),
                    Err(e) => warn!("Journal compaction failed: {}", e),
                }
            }

            info!("Compaction task stopped");
        });
        self.background_tasks.push(task);
    }

    /// Start the uptime and stats reporting task
    fn start_uptime_task(&mut self) {
        let coordinator = self.coordinator.clone();
        let metrics_collector = self.metrics_collector.clone();
        let is_running = self.is_running.clone();
        let started_at = self.started_at;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));

            while *is_running.read().await {
                interval.tick().await;

                metrics_collector.update_uptime(started_at.elapsed());
                match coordinator.get_stats().await {
                    Ok(stats) => debug!(
                        "Service stats - waiting: {}, matched: {}, expired: {}",
                        stats.entries_waiting, stats.matches_created, stats.entries_expired
                    ),
                    Err(e) => warn!("Failed to get stats for metrics update: {}", e),
                }
            }
        });
        self.background_tasks.push(task);
    }
}
