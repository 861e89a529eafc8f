//! The fetch/collate collaborator boundary.
//!
//! The pipeline never looks inside an example: it hands a `BatchFetcher`
//! one index at a time and receives an opaque collated batch back. Each
//! worker owns its own clone of the fetcher and processes one batch to
//! completion before touching the next, so fetcher-local mutable state
//! (an active scale, open file handles, decode buffers) needs no
//! synchronization.

use anyhow::Result;

/// Turns indices into items and items into a collated batch.
///
/// # Multi-scale variant
///
/// Fetchers that support several sampling configurations (e.g. multiple
/// training resolutions) expose them through `num_scales`/`set_scale`.
/// The worker picks one scale per batch from its own seeded RNG and calls
/// `set_scale` before the first `fetch` of that batch; the selection holds
/// for the whole fetch+collate unit, so a batch never observes a scale
/// change mid-collation.
///
/// # Staging
///
/// `stage` is the optional relay transform (e.g. copying into pinned
/// memory). When the loader is configured with `staging = true` it runs on
/// a dedicated thread between the workers and the consumer; in synchronous
/// mode it runs inline.
pub trait BatchFetcher: Send {
    /// One fetched example.
    type Item;
    /// The collated batch delivered to the consumer.
    type Batch: Send + 'static;

    /// Loads a single example. Domain errors are delivered to the consumer
    /// at this batch's position in the output order.
    fn fetch(&mut self, index: usize) -> Result<Self::Item>;

    /// Combines fetched items into one batch.
    fn collate(&mut self, items: Vec<Self::Item>) -> Result<Self::Batch>;

    /// Number of candidate sampling configurations. 1 disables selection.
    fn num_scales(&self) -> usize {
        1
    }

    /// Activates one sampling configuration for the next fetch+collate.
    fn set_scale(&mut self, _scale: usize) {}

    /// Post-processing applied between worker output and delivery.
    fn stage(&mut self, batch: Self::Batch) -> Self::Batch {
        batch
    }
}
