//! Classified pipeline-fatal errors.
//!
//! Per-batch fetch/collate failures travel as plain `anyhow::Error` chains
//! and are re-raised at the consumer exactly where the failed batch would
//! have been delivered. Everything in this module is fatal to the pipeline:
//! the iterator shuts itself down before propagating one of these.

use std::time::Duration;
use thiserror::Error;

/// Errors that terminate a pipeline pass.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// One or more worker threads exited without being asked to.
    /// Detected by liveness polling on a receive that came up empty.
    #[error("prefetch worker(s) {workers:?} exited unexpectedly")]
    WorkerDeath {
        /// Ids of the workers that were found dead.
        workers: Vec<usize>,
    },

    /// The staging thread exited while the consumer still expected data
    /// from it.
    #[error("staging thread exited unexpectedly")]
    RelayDeath,

    /// The hard timeout elapsed with no result arriving.
    #[error("prefetch timed out after {waited:?} waiting for a batch")]
    Timeout {
        /// How long the consumer waited before giving up.
        waited: Duration,
    },

    /// A data-producing call was made after the pipeline was shut down.
    #[error("pipeline already shut down; create a new iterator to load more data")]
    ShutdownMisuse,
}
