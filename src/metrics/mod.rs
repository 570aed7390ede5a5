//! Metrics for the cache engine.
//!
//! - **Store metrics**: hits and misses against the shared keyed store
//! - **Source metrics**: calls, transient failures, definitive load failures
//! - **Maintenance metrics**: preloads, forced reloads, patches, invalidations
//! - **Prometheus export**: exposition-format rendering

mod cache_metrics;
mod collector;

pub use cache_metrics::{CacheMetrics, MetricsSummary};
pub use collector::{Counter, Gauge, Histogram, Timer};
