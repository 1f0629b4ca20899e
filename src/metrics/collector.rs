//! Metrics collection using Prometheus
//!
//! Queue throughput, depth, and latency metrics for the waiting-room
//! service, exported through a shared Prometheus registry.

use crate::types::MatchType;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the queue service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue throughput metrics
    queue_metrics: QueueMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,
}

/// Queue throughput metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Total entries enqueued by match type
    pub entries_enqueued_total: IntCounterVec,

    /// Total entries cancelled by their player
    pub entries_cancelled_total: IntCounterVec,

    /// Total entries dropped by expiry
    pub entries_expired_total: IntCounterVec,

    /// Total matches created by match type
    pub matches_created_total: IntCounterVec,

    /// Entries currently waiting, by match type
    pub queue_depth: IntGaugeVec,

    /// Time from enqueue to match
    pub match_wait_seconds: HistogramVec,

    /// Journal compactions run
    pub compactions_total: IntCounter,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Duration of one matching pass over all partitions
    pub match_pass_duration: Histogram,

    /// Duration of one expiry sweep
    pub expiry_sweep_duration: Histogram,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get queue metrics
    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Record an entry joining the queue
    pub fn record_enqueue(&self, match_type: MatchType) {
        self.queue_metrics
            .entries_enqueued_total
            .with_label_values(&[match_type_label(match_type)])
            .inc();
    }

    /// Record a player-initiated cancellation
    pub fn record_cancel(&self, match_type: MatchType) {
        self.queue_metrics
            .entries_cancelled_total
            .with_label_values(&[match_type_label(match_type)])
            .inc();
    }

    /// Record an entry dropped by the expiry sweep
    pub fn record_expiry(&self, match_type: MatchType) {
        self.queue_metrics
            .entries_expired_total
            .with_label_values(&[match_type_label(match_type)])
            .inc();
    }

    /// Record a match and the time its entries waited
    pub fn record_match(&self, match_type: MatchType, waited: Duration) {
        self.queue_metrics
            .matches_created_total
            .with_label_values(&[match_type_label(match_type)])
            .inc();
        self.queue_metrics
            .match_wait_seconds
            .with_label_values(&[match_type_label(match_type)])
            .observe(waited.as_secs_f64());
    }

    /// Set the current number of waiting entries for a match type
    pub fn set_queue_depth(&self, match_type: MatchType, depth: usize) {
        self.queue_metrics
            .queue_depth
            .with_label_values(&[match_type_label(match_type)])
            .set(depth as i64);
    }

    /// Record one full matching pass
    pub fn record_match_pass(&self, duration: Duration) {
        self.performance_metrics
            .match_pass_duration
            .observe(duration.as_secs_f64());
    }

    /// Record one expiry sweep
    pub fn record_expiry_sweep(&self, duration: Duration) {
        self.performance_metrics
            .expiry_sweep_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a journal compaction
    pub fn record_compaction(&self) {
        self.queue_metrics.compactions_total.inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update service uptime
    pub fn update_uptime(&self, uptime: Duration) {
        self.service_metrics
            .uptime_seconds
            .set(uptime.as_secs() as i64);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

fn match_type_label(match_type: MatchType) -> &'static str {
    match match_type {
        MatchType::Casual => "casual",
        MatchType::Rated => "rated",
        MatchType::Invite => "invite",
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("waiting_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "waiting_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let entries_enqueued_total = IntCounterVec::new(
            Opts::new(
                "waiting_room_entries_enqueued_total",
                "Total entries enqueued",
            ),
            &["match_type"],
        )?;
        registry.register(Box::new(entries_enqueued_total.clone()))?;

        let entries_cancelled_total = IntCounterVec::new(
            Opts::new(
                "waiting_room_entries_cancelled_total",
                "Total entries cancelled by their player",
            ),
            &["match_type"],
        )?;
        registry.register(Box::new(entries_cancelled_total.clone()))?;

        let entries_expired_total = IntCounterVec::new(
            Opts::new(
                "waiting_room_entries_expired_total",
                "Total entries dropped by expiry",
            ),
            &["match_type"],
        )?;
        registry.register(Box::new(entries_expired_total.clone()))?;

        let matches_created_total = IntCounterVec::new(
            Opts::new(
                "waiting_room_matches_created_total",
                "Total matches created",
            ),
            &["match_type"],
        )?;
        registry.register(Box::new(matches_created_total.clone()))?;

        let queue_depth = IntGaugeVec::new(
            Opts::new("waiting_room_queue_depth", "Entries currently waiting"),
            &["match_type"],
        )?;
        registry.register(Box::new(queue_depth.clone()))?;

        let match_wait_seconds = HistogramVec::new(
            HistogramOpts::new(
                "waiting_room_match_wait_seconds",
                "Time from enqueue to match",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
            &["match_type"],
        )?;
        registry.register(Box::new(match_wait_seconds.clone()))?;

        let compactions_total = IntCounter::new(
            "waiting_room_compactions_total",
            "Journal compactions run",
        )?;
        registry.register(Box::new(compactions_total.clone()))?;

        Ok(Self {
            entries_enqueued_total,
            entries_cancelled_total,
            entries_expired_total,
            matches_created_total,
            queue_depth,
            match_wait_seconds,
            compactions_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let match_pass_duration = Histogram::with_opts(
            HistogramOpts::new(
                "waiting_room_match_pass_duration_seconds",
                "Duration of one matching pass",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(match_pass_duration.clone()))?;

        let expiry_sweep_duration = Histogram::with_opts(
            HistogramOpts::new(
                "waiting_room_expiry_sweep_duration_seconds",
                "Duration of one expiry sweep",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(expiry_sweep_duration.clone()))?;

        Ok(Self {
            match_pass_duration,
            expiry_sweep_duration,
        })
    }
}
