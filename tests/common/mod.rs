//! Shared fetchers and sources for the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use data_prefetch::BatchFetcher;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Fetches `index * 10`; collates into a plain `Vec<i64>`.
#[derive(Clone)]
pub struct TimesTenFetcher;

impl BatchFetcher for TimesTenFetcher {
    type Item = i64;
    type Batch = Vec<i64>;

    fn fetch(&mut self, index: usize) -> Result<i64> {
        Ok(index as i64 * 10)
    }

    fn collate(&mut self, items: Vec<i64>) -> Result<Vec<i64>> {
        Ok(items)
    }
}

/// Like `TimesTenFetcher` but with a per-index delay, so workers finish
/// out of order on purpose.
#[derive(Clone)]
pub struct JitterFetcher {
    pub unit: Duration,
}

impl BatchFetcher for JitterFetcher {
    type Item = i64;
    type Batch = Vec<i64>;

    fn fetch(&mut self, index: usize) -> Result<i64> {
        // Earlier indices sleep longer, inverting natural completion order.
        std::thread::sleep(self.unit * ((7 - (index as u32 % 8)) + 1));
        Ok(index as i64 * 10)
    }

    fn collate(&mut self, items: Vec<i64>) -> Result<Vec<i64>> {
        Ok(items)
    }
}

/// Fails fetching one specific index with a recognizable message.
#[derive(Clone)]
pub struct FailingFetcher {
    pub fail_index: usize,
}

impl BatchFetcher for FailingFetcher {
    type Item = i64;
    type Batch = Vec<i64>;

    fn fetch(&mut self, index: usize) -> Result<i64> {
        if index == self.fail_index {
            return Err(anyhow!("corrupt example at index {index}"));
        }
        Ok(index as i64 * 10)
    }

    fn collate(&mut self, items: Vec<i64>) -> Result<Vec<i64>> {
        Ok(items)
    }
}

/// Panics (kills its worker thread) on one specific index.
#[derive(Clone)]
pub struct PanickingFetcher {
    pub panic_index: usize,
}

impl BatchFetcher for PanickingFetcher {
    type Item = i64;
    type Batch = Vec<i64>;

    fn fetch(&mut self, index: usize) -> Result<i64> {
        if index == self.panic_index {
            panic!("simulated worker crash at index {index}");
        }
        Ok(index as i64)
    }

    fn collate(&mut self, items: Vec<i64>) -> Result<Vec<i64>> {
        Ok(items)
    }
}

/// Sleeps a fixed time per batch; for timeout tests.
#[derive(Clone)]
pub struct SlowFetcher {
    pub delay: Duration,
}

impl BatchFetcher for SlowFetcher {
    type Item = i64;
    type Batch = Vec<i64>;

    fn fetch(&mut self, index: usize) -> Result<i64> {
        std::thread::sleep(self.delay);
        Ok(index as i64)
    }

    fn collate(&mut self, items: Vec<i64>) -> Result<Vec<i64>> {
        Ok(items)
    }
}

/// Counts every fetch across all worker clones.
#[derive(Clone)]
pub struct CountingFetcher {
    pub fetched: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl CountingFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            fetched: Arc::new(AtomicUsize::new(0)),
            delay,
        }
    }
}

impl BatchFetcher for CountingFetcher {
    type Item = i64;
    type Batch = Vec<i64>;

    fn fetch(&mut self, index: usize) -> Result<i64> {
        self.fetched.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(index as i64)
    }

    fn collate(&mut self, items: Vec<i64>) -> Result<Vec<i64>> {
        Ok(items)
    }
}

/// Marks batches in `stage` so tests can tell the staging thread ran.
#[derive(Clone)]
pub struct StagingFetcher;

impl BatchFetcher for StagingFetcher {
    type Item = i64;
    type Batch = Vec<i64>;

    fn fetch(&mut self, index: usize) -> Result<i64> {
        Ok(index as i64)
    }

    fn collate(&mut self, items: Vec<i64>) -> Result<Vec<i64>> {
        Ok(items)
    }

    fn stage(&mut self, batch: Vec<i64>) -> Vec<i64> {
        batch.into_iter().map(|v| v + 1000).collect()
    }
}

/// `stage` panics, killing the staging thread.
#[derive(Clone)]
pub struct PanickingStageFetcher;

impl BatchFetcher for PanickingStageFetcher {
    type Item = i64;
    type Batch = Vec<i64>;

    fn fetch(&mut self, index: usize) -> Result<i64> {
        Ok(index as i64)
    }

    fn collate(&mut self, items: Vec<i64>) -> Result<Vec<i64>> {
        Ok(items)
    }

    fn stage(&mut self, _batch: Vec<i64>) -> Vec<i64> {
        panic!("simulated staging crash");
    }
}

/// Multi-scale fetcher: every item records the scale that was active when
/// it was fetched, and `collate` rejects a batch that saw more than one.
#[derive(Clone)]
pub struct ScaledFetcher {
    pub scales: usize,
    pub current: usize,
}

impl ScaledFetcher {
    pub fn new(scales: usize) -> Self {
        Self { scales, current: 0 }
    }
}

impl BatchFetcher for ScaledFetcher {
    type Item = (usize, usize);
    type Batch = Vec<(usize, usize)>;

    fn fetch(&mut self, index: usize) -> Result<(usize, usize)> {
        Ok((self.current, index))
    }

    fn collate(&mut self, items: Vec<(usize, usize)>) -> Result<Vec<(usize, usize)>> {
        if let Some(&(first_scale, _)) = items.first() {
            if items.iter().any(|&(scale, _)| scale != first_scale) {
                return Err(anyhow!("scale changed mid-batch"));
            }
        }
        Ok(items)
    }

    fn num_scales(&self) -> usize {
        self.scales
    }

    fn set_scale(&mut self, scale: usize) {
        self.current = scale;
    }
}

/// Single-index batches `[[0], [1], ..., [n-1]]`.
pub fn unit_batches(n: usize) -> Vec<Vec<usize>> {
    (0..n).map(|i| vec![i]).collect()
}
