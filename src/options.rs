//! Configuration options for rowcache.

use std::time::Duration;

/// Default number of attempts when loading from the data source.
pub const DEFAULT_REPEAT_COUNT: usize = 5;

/// Default pause between load attempts (200ms).
pub const DEFAULT_REPEAT_DELAY: Duration = Duration::from_millis(200);

/// Default capacity of the in-memory keyed store (entries).
pub const DEFAULT_STORE_CAPACITY: usize = 100_000;

/// Upper bound on a sane retry delay.
pub const MAX_REPEAT_DELAY: Duration = Duration::from_secs(60);

/// Cache coordinator configuration.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    // === Retry ===
    /// Number of attempts made against the data source before giving up.
    pub repeat_count: usize,

    /// Pause between two attempts.
    pub repeat_delay: Duration,

    // === Threading ===
    /// Only allow access from the thread that created the coordinator.
    pub single_thread: bool,

    // === Logging ===
    /// Log the first transient failure at WARN even when load tracing is off.
    pub log_first_failure: bool,

    /// Emit DEBUG events for every load cycle.
    pub trace_loads: bool,

    // === Store ===
    /// Capacity of the default in-memory store.
    pub store_capacity: usize,

    // === Source ===
    /// Issue one source round trip per table even if the source does not ask for it.
    pub split_by_table: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            // Retry
            repeat_count: DEFAULT_REPEAT_COUNT,
            repeat_delay: DEFAULT_REPEAT_DELAY,

            // Threading
            single_thread: false,

            // Logging
            log_first_failure: true,
            trace_loads: false,

            // Store
            store_capacity: DEFAULT_STORE_CAPACITY,

            // Source
            split_by_table: false,
        }
    }
}

impl CacheOptions {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the options.
    pub fn validate(&self) -> crate::Result<()> {
        if self.repeat_count == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "repeat_count must be at least 1".into(),
            ));
        }

        if self.repeat_delay > MAX_REPEAT_DELAY {
            return Err(crate::Error::InvalidConfiguration(format!(
                "repeat_delay cannot exceed {:?}",
                MAX_REPEAT_DELAY
            )));
        }

        if self.store_capacity == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "store_capacity must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Whether the first failure of a load cycle is logged unconditionally.
    ///
    /// Only meaningful when more than one attempt is configured.
    pub fn logs_first_failure(&self) -> bool {
        self.log_first_failure && self.repeat_count > 1
    }
}

/// Builder for CacheOptions.
#[derive(Debug, Clone, Default)]
pub struct CacheOptionsBuilder {
    options: CacheOptions,
}

impl CacheOptionsBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set repeat_count.
    pub fn repeat_count(mut self, count: usize) -> Self {
        self.options.repeat_count = count;
        self
    }

    /// Set repeat_delay.
    pub fn repeat_delay(mut self, delay: Duration) -> Self {
        self.options.repeat_delay = delay;
        self
    }

    /// Set single_thread.
    pub fn single_thread(mut self, value: bool) -> Self {
        self.options.single_thread = value;
        self
    }

    /// Set log_first_failure.
    pub fn log_first_failure(mut self, value: bool) -> Self {
        self.options.log_first_failure = value;
        self
    }

    /// Set trace_loads.
    pub fn trace_loads(mut self, value: bool) -> Self {
        self.options.trace_loads = value;
        self
    }

    /// Set store_capacity.
    pub fn store_capacity(mut self, capacity: usize) -> Self {
        self.options.store_capacity = capacity;
        self
    }

    /// Set split_by_table.
    pub fn split_by_table(mut self, value: bool) -> Self {
        self.options.split_by_table = value;
        self
    }

    /// Build the options.
    pub fn build(self) -> crate::Result<CacheOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}
