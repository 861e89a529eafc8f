//! Configuration for prefetch behaviour.
//!
//! Example:
//! ```ignore
//! let config = PrefetchConfig::builder()
//!     .num_workers(4)
//!     .prefetch_factor(2)
//!     .staging(true)
//!     .timeout(Duration::from_secs(30))
//!     .build();
//! ```

use std::time::Duration;

/// Configuration for the prefetch pipeline.
#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    /// Number of parallel workers (0 = fully synchronous, no pipeline).
    pub num_workers: usize,
    /// Window multiplier: at most `prefetch_factor * num_workers` batches
    /// may be dispatched but undelivered at once. Must be > 0 when using
    /// workers.
    pub prefetch_factor: usize,
    /// Whether to run results through the staging thread
    /// (`BatchFetcher::stage`) before delivery.
    pub staging: bool,
    /// Hard limit on how long `next()` may wait for a batch.
    /// `Duration::ZERO` disables the limit. Default: disabled.
    pub timeout: Duration,
    /// How often a blocked receive wakes up to check worker liveness.
    /// Not an error timeout, just a polling cadence. Default: 100ms.
    pub poll_interval: Duration,
    /// Base seed for per-worker RNGs (scale selection). A random seed is
    /// drawn when unset.
    pub seed: Option<u64>,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            prefetch_factor: 2,
            staging: false,
            timeout: Duration::ZERO,
            poll_interval: Duration::from_millis(100),
            seed: None,
        }
    }
}

impl PrefetchConfig {
    pub fn builder() -> PrefetchConfigBuilder {
        PrefetchConfigBuilder::default()
    }

    /// The in-flight window for this configuration.
    pub fn window(&self) -> usize {
        self.num_workers * self.prefetch_factor
    }
}

/// Builder for `PrefetchConfig` with method chaining.
#[derive(Default)]
pub struct PrefetchConfigBuilder {
    config: PrefetchConfig,
}

impl PrefetchConfigBuilder {
    /// Set the number of workers. 0 disables the pipeline entirely.
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    /// Set the window multiplier (batches in flight per worker).
    ///
    /// Higher values smooth over variable batch cost but hold more
    /// batches in memory.
    pub fn prefetch_factor(mut self, factor: usize) -> Self {
        self.config.prefetch_factor = factor;
        self
    }

    /// Route results through the staging thread before delivery.
    pub fn staging(mut self, staging: bool) -> Self {
        self.config.staging = staging;
        self
    }

    /// Set the hard receive timeout. `Duration::ZERO` disables it.
    ///
    /// - Too low: cancels passes during legitimately slow loading
    /// - Too high: delays detection of a stalled pipeline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the liveness polling interval.
    ///
    /// - Too low: more responsive death detection, more wakeups
    /// - Too high: a dead worker goes unnoticed for longer
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the base seed for reproducible per-batch scale selection.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> PrefetchConfig {
        self.config
    }
}
