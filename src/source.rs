//! Index-batch sources.
//!
//! A `BatchSource` produces the ordered, finite sequence of index-batches
//! for one pass. It is consumed exactly once per `PrefetchIter`; iterating
//! again requires a fresh source (and a fresh iterator).

use anyhow::{anyhow, Result};

/// Produces the ordered sequence of index-batches for one pass.
pub trait BatchSource: Send {
    /// Total number of batches in one pass.
    fn len(&self) -> usize;

    /// Whether the pass is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next index-batch in order, or `None` once the pass is exhausted.
    fn next_batch(&mut self) -> Option<Vec<usize>>;
}

/// Chunks `0..dataset_len` into consecutive fixed-size batches.
///
/// The order-of-indices decision (shuffling, weighting, resume offsets)
/// belongs to whoever builds the source; this one is the plain sequential
/// case.
#[derive(Debug, Clone)]
pub struct SequentialBatchSource {
    dataset_len: usize,
    batch_size: usize,
    drop_last: bool,
    pos: usize,
}

impl SequentialBatchSource {
    /// Creates a sequential source. `batch_size` must be > 0.
    pub fn new(dataset_len: usize, batch_size: usize, drop_last: bool) -> Result<Self> {
        if batch_size == 0 {
            return Err(anyhow!("batch_size must be greater than 0"));
        }
        Ok(Self {
            dataset_len,
            batch_size,
            drop_last,
            pos: 0,
        })
    }
}

impl BatchSource for SequentialBatchSource {
    fn len(&self) -> usize {
        if self.drop_last {
            self.dataset_len / self.batch_size
        } else {
            self.dataset_len.div_ceil(self.batch_size)
        }
    }

    fn next_batch(&mut self) -> Option<Vec<usize>> {
        if self.pos >= self.dataset_len {
            return None;
        }
        let end = (self.pos + self.batch_size).min(self.dataset_len);
        if self.drop_last && end - self.pos < self.batch_size {
            self.pos = self.dataset_len;
            return None;
        }
        let batch = (self.pos..end).collect();
        self.pos = end;
        Some(batch)
    }
}

/// Replays an explicit list of index-batches.
///
/// Useful for custom sampling orders and for resuming a pass from a known
/// point.
#[derive(Debug, Clone)]
pub struct FixedBatchSource {
    batches: std::vec::IntoIter<Vec<usize>>,
    total: usize,
}

impl FixedBatchSource {
    pub fn new(batches: Vec<Vec<usize>>) -> Self {
        let total = batches.len();
        Self {
            batches: batches.into_iter(),
            total,
        }
    }
}

impl BatchSource for FixedBatchSource {
    fn len(&self) -> usize {
        self.total
    }

    fn next_batch(&mut self) -> Option<Vec<usize>> {
        self.batches.next()
    }
}
