//! Cache engine metrics.

use std::fmt;

use super::collector::{Counter, Gauge, Histogram};

/// Counters and histograms maintained by a cache coordinator.
#[derive(Debug)]
pub struct CacheMetrics {
    /// Value lookups through table caches.
    pub lookups: Counter,
    /// Batch lookups answered by the shared store.
    pub store_hits: Counter,
    /// Batch lookups the store could not answer.
    pub store_misses: Counter,
    /// Calls to the data source, retries included.
    pub source_calls: Counter,
    /// Data source calls that failed with a transient error.
    pub source_failures: Counter,
    /// Loads that failed definitively.
    pub load_failures: Counter,
    /// Hinted pages added to outgoing requests.
    pub preload_pages: Counter,
    /// Pages cleared and reloaded because a row was missing.
    pub forced_reloads: Counter,
    /// Rows patched in place by row updates.
    pub rows_patched: Counter,
    /// Invalidations applied.
    pub invalidations: Counter,
    /// Registered table caches.
    pub tables: Gauge,
    /// Source call latency (microseconds).
    pub load_latency: Histogram,
    /// Lookups per source call.
    pub batch_size: Histogram,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self {
            lookups: Counter::new(),
            store_hits: Counter::new(),
            store_misses: Counter::new(),
            source_calls: Counter::new(),
            source_failures: Counter::new(),
            load_failures: Counter::new(),
            preload_pages: Counter::new(),
            forced_reloads: Counter::new(),
            rows_patched: Counter::new(),
            invalidations: Counter::new(),
            tables: Gauge::new(),
            load_latency: Histogram::latency(),
            batch_size: Histogram::sizes(),
        }
    }

    /// Fraction of batch lookups answered by the store.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.store_hits.get();
        let total = hits + self.store_misses.get();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Render in Prometheus exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        let counters = [
            ("rowcache_lookups_total", "Value lookups", &self.lookups),
            ("rowcache_store_hits_total", "Lookups answered by the store", &self.store_hits),
            ("rowcache_store_misses_total", "Lookups missing from the store", &self.store_misses),
            ("rowcache_source_calls_total", "Data source calls", &self.source_calls),
            ("rowcache_source_failures_total", "Transient data source failures", &self.source_failures),
            ("rowcache_load_failures_total", "Definitive load failures", &self.load_failures),
            ("rowcache_preload_pages_total", "Hinted pages piggybacked on loads", &self.preload_pages),
            ("rowcache_forced_reloads_total", "Pages reloaded for a missing row", &self.forced_reloads),
            ("rowcache_rows_patched_total", "Rows patched in place", &self.rows_patched),
            ("rowcache_invalidations_total", "Invalidations applied", &self.invalidations),
        ];
        for (name, help, counter) in counters {
            out.push_str(&format!("# HELP {} {}\n", name, help));
            out.push_str(&format!("# TYPE {} counter\n", name));
            out.push_str(&format!("{} {}\n\n", name, counter.get()));
        }

        out.push_str("# HELP rowcache_tables Registered table caches\n");
        out.push_str("# TYPE rowcache_tables gauge\n");
        out.push_str(&format!("rowcache_tables {}\n\n", self.tables.get()));

        out.push_str("# HELP rowcache_load_latency_us Data source call latency\n");
        out.push_str("# TYPE rowcache_load_latency_us histogram\n");
        out.push_str(&self.load_latency.to_prometheus("rowcache_load_latency_us"));
        out.push('\n');

        out.push_str("# HELP rowcache_batch_size Lookups per data source call\n");
        out.push_str("# TYPE rowcache_batch_size histogram\n");
        out.push_str(&self.batch_size.to_prometheus("rowcache_batch_size"));
        out
    }

    /// Snapshot for display.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            lookups: self.lookups.get(),
            store_hits: self.store_hits.get(),
            store_misses: self.store_misses.get(),
            hit_rate: self.hit_rate(),
            source_calls: self.source_calls.get(),
            source_failures: self.source_failures.get(),
            load_failures: self.load_failures.get(),
            preload_pages: self.preload_pages.get(),
            forced_reloads: self.forced_reloads.get(),
            rows_patched: self.rows_patched.get(),
            invalidations: self.invalidations.get(),
            tables: self.tables.get(),
            load_latency_mean_us: self.load_latency.mean(),
            batch_size_mean: self.batch_size.mean(),
        }
    }
}

/// Point-in-time copy of the cache metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub lookups: u64,
    pub store_hits: u64,
    pub store_misses: u64,
    pub hit_rate: f64,
    pub source_calls: u64,
    pub source_failures: u64,
    pub load_failures: u64,
    pub preload_pages: u64,
    pub forced_reloads: u64,
    pub rows_patched: u64,
    pub invalidations: u64,
    pub tables: i64,
    pub load_latency_mean_us: f64,
    pub batch_size_mean: f64,
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Row Cache Metrics ===")?;
        writeln!(f)?;
        writeln!(f, "Lookups:   {} ({} tables)", self.lookups, self.tables)?;
        writeln!(f, "Store:     {} hits, {} misses ({:.1}% hit rate)", self.store_hits, self.store_misses, self.hit_rate * 100.0)?;
        writeln!(f)?;
        writeln!(f, "Source:")?;
        writeln!(f, "  Calls:         {}", self.source_calls)?;
        writeln!(f, "  Failures:      {}", self.source_failures)?;
        writeln!(f, "  Load failures: {}", self.load_failures)?;
        writeln!(f, "  Mean latency:  {:.2} µs", self.load_latency_mean_us)?;
        writeln!(f, "  Mean batch:    {:.1} lookups", self.batch_size_mean)?;
        writeln!(f)?;
        writeln!(f, "Maintenance:")?;
        writeln!(f, "  Preloaded pages: {}", self.preload_pages)?;
        writeln!(f, "  Forced reloads:  {}", self.forced_reloads)?;
        writeln!(f, "  Rows patched:    {}", self.rows_patched)?;
        writeln!(f, "  Invalidations:   {}", self.invalidations)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.hit_rate(), 0.0);
        metrics.store_hits.add(3);
        metrics.store_misses.inc();
        assert!((metrics.hit_rate() - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = CacheMetrics::new();
        metrics.source_calls.add(7);
        metrics.tables.set(2);
        metrics.batch_size.observe(3);

        let text = metrics.to_prometheus();
        assert!(text.contains("rowcache_source_calls_total 7"));
        assert!(text.contains("# TYPE rowcache_tables gauge"));
        assert!(text.contains("rowcache_tables 2"));
        assert!(text.contains("rowcache_batch_size_count 1"));
    }

    #[test]
    fn test_summary_display() {
        let metrics = CacheMetrics::new();
        metrics.lookups.add(10);
        metrics.store_hits.add(9);
        metrics.store_misses.add(1);

        let summary = metrics.summary();
        assert_eq!(summary.lookups, 10);
        let text = summary.to_string();
        assert!(text.contains("Lookups:   10"));
        assert!(text.contains("90.0% hit rate"));
    }
}
