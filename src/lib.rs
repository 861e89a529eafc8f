//! Bounded-window, multi-worker batch prefetching with ordered delivery.
//!
//! `data_prefetch` feeds a consumer collated batches at a sustained rate
//! while a fixed pool of worker threads runs the slow part (example
//! loading, decoding, augmentation) ahead of it. The engine guarantees:
//!
//! - **Order**: batches arrive in exactly the order the `BatchSource`
//!   produced them, regardless of which worker finishes first.
//! - **Bounded memory**: at most `prefetch_factor × num_workers` batches
//!   are dispatched but undelivered at any instant.
//! - **Failure visibility**: a batch that fails to load surfaces as an
//!   error at its position in the sequence; a worker that dies or stalls
//!   surfaces as a classified error instead of a hang.
//! - **Clean teardown**: shutdown is idempotent, runs on drop, and joins
//!   every thread it spawned.
//!
//! The numeric payload is opaque: the engine is generic over whatever
//! `BatchFetcher::Batch` the collaborator produces.

pub mod error;
pub mod fetcher;
pub mod loader;
pub mod registry;
pub mod source;

pub use error::PipelineError;
pub use fetcher::BatchFetcher;
pub use loader::{PrefetchConfig, PrefetchConfigBuilder, PrefetchIter, PrefetchLoader};
pub use registry::WorkerRegistry;
pub use source::{BatchSource, FixedBatchSource, SequentialBatchSource};
