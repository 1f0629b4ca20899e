//! Queue coordination: the public surface over store, matcher, and notifier

pub mod coordinator;

pub use coordinator::{QueueCoordinator, QueueCoordinatorStats};
