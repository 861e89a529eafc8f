//! src/loader/mod.rs
//!
//! This module implements the prefetch pipeline.
//!
//! The `PrefetchLoader` coordinates a `BatchSource` and a `BatchFetcher`
//! to keep a consumer supplied with collated batches at a sustained rate,
//! in source order, with bounded memory and deterministic teardown.
//!
//! # Architecture Overview
//!
//! ```text
//!                ┌─────────────┐
//!                │ BatchSource │ (ordered index-batches, one pass)
//!                └──────┬──────┘
//!                       │ next_batch()
//!                       ↓
//!                ┌─────────────┐
//!                │ Dispatcher  │ ←──── PrefetchConfig (workers, window, ...)
//!                └──────┬──────┘
//!                       │ (seq, indices), round-robin, ≤ window in flight
//!                       ↓
//!               [ Worker threads ]  fetch + collate (BatchFetcher clone each)
//!                       │
//!                       │ (seq, result) on the shared output channel
//!                       ↓
//!               [ Staging thread ]  optional, applies BatchFetcher::stage
//!                       │
//!                       ↓
//!               ┌───────────────┐
//!               │ ReorderBuffer │  restores strict sequence order
//!               └───────┬───────┘
//!                       │
//!                       ↓
//!                  PrefetchIter::next()  → batches in source order
//! ```
//!
//! # Module Structure
//!
//! ```text
//! src/loader/
//! ├── mod.rs         # PrefetchLoader and public exports
//! ├── config.rs      # PrefetchConfig, builder, and validation
//! ├── dispatch.rs    # Sequence numbering, round-robin, window bookkeeping
//! ├── reorder.rs     # Out-of-order arrival buffer
//! ├── iterator.rs    # PrefetchIter: next(), liveness detector, shutdown
//! └── workers/
//!     ├── mod.rs     # Task and output message types
//!     └── pool.rs    # Worker pool, worker loop, staging thread
//! ```
//!
//! # Example
//!
//! ```ignore
//! let config = PrefetchConfig::builder()
//!     .num_workers(4)
//!     .prefetch_factor(2)
//!     .staging(true)
//!     .build();
//!
//! let loader = PrefetchLoader::new(fetcher, config)?;
//! let source = SequentialBatchSource::new(dataset_len, 16, true)?;
//!
//! for batch in loader.iter(source)? {
//!     let batch = batch?;
//!     // feed the model
//! }
//! ```
//!
//! # Guarantees
//!
//! - Delivery order equals source order for every worker count, including 0.
//! - At most `prefetch_factor × num_workers` batches are in flight, which
//!   bounds peak memory to roughly one window of batches.
//! - A dead or stalled worker surfaces as an error within one poll
//!   interval instead of hanging the consumer.
//! - Teardown is single-shot and leak-free no matter how the pass ends.

mod config;
mod dispatch;
mod iterator;
mod reorder;
mod workers;

pub use config::{PrefetchConfig, PrefetchConfigBuilder};
pub use iterator::PrefetchIter;

use anyhow::{anyhow, Result};
use rand::Rng;
use std::sync::Arc;

use crate::fetcher::BatchFetcher;
use crate::registry::WorkerRegistry;
use crate::source::BatchSource;

/// Entry point: holds the fetcher and configuration, and builds one
/// `PrefetchIter` per pass.
///
/// The loader itself spawns nothing; all threads belong to an iterator
/// and are joined when that iterator shuts down. Several passes can be
/// run from one loader, each with a fresh source.
pub struct PrefetchLoader<F> {
    fetcher: F,
    config: PrefetchConfig,
    registry: Arc<WorkerRegistry>,
    base_seed: u64,
}

impl<F> PrefetchLoader<F>
where
    F: BatchFetcher + Clone + Send + 'static,
{
    /// Creates a loader, validating the configuration.
    ///
    /// # Errors
    /// - `prefetch_factor` of 0 with workers configured (the window would
    ///   be empty and the pipeline could never move)
    /// - zero `poll_interval` with workers configured
    pub fn new(fetcher: F, config: PrefetchConfig) -> Result<Self> {
        if config.num_workers > 0 && config.prefetch_factor == 0 {
            return Err(anyhow!(
                "prefetch_factor must be > 0 when using {} workers",
                config.num_workers
            ));
        }
        if config.num_workers > 0 && config.poll_interval.is_zero() {
            return Err(anyhow!("poll_interval must be nonzero when using workers"));
        }

        let base_seed = config.seed.unwrap_or_else(|| rand::rng().random());

        Ok(Self {
            fetcher,
            config,
            registry: Arc::new(WorkerRegistry::new()),
            base_seed,
        })
    }

    /// Uses a shared worker registry instead of a private one, so several
    /// loaders can be observed through one table.
    pub fn with_registry(mut self, registry: Arc<WorkerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// The registry this loader's pipelines report their workers to.
    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    /// Starts one pass over `source`: spawns the worker pool (unless
    /// `num_workers == 0`), registers the workers, and primes the dispatch
    /// window.
    pub fn iter<S: BatchSource>(&self, source: S) -> Result<PrefetchIter<S, F>> {
        if self.config.num_workers == 0 {
            return Ok(PrefetchIter::synchronous(
                source,
                self.fetcher.clone(),
                self.config.staging,
                self.base_seed,
            ));
        }

        PrefetchIter::pipelined(
            source,
            &self.fetcher,
            &self.config,
            self.base_seed,
            self.registry.clone(),
        )
    }
}
