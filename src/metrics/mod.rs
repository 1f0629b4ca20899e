//! Metrics collection for the waiting-room queue service

pub mod collector;

pub use collector::{MetricsCollector, MetricsTimer, PerformanceMetrics, QueueMetrics, ServiceMetrics};
