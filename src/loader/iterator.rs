//! One pass of the prefetch pipeline.
//!
//! `PrefetchIter` is created by `PrefetchLoader::iter()` and drives the
//! whole pipeline from the consumer thread: every successful delivery
//! dispatches one more index-batch, so the in-flight count stays at the
//! window bound in steady state and memory stays proportional to one
//! window of batches.
//!
//! Delivery order always equals source order. Workers may finish out of
//! order; early arrivals wait in the reorder buffer.
//!
//! A pass ends one of four ways, and all of them run the same idempotent
//! teardown:
//! - the source drains and every in-flight batch is delivered (`None`)
//! - a fetch/collate failure is delivered at its sequence position and
//!   fuses the iterator
//! - a pipeline-fatal error (worker death, staging death, hard timeout)
//!   is returned after teardown
//! - `shutdown()` is called, or the iterator is dropped

use anyhow::{anyhow, Result};
use crossbeam_channel::RecvTimeoutError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::config::PrefetchConfig;
use super::dispatch::Dispatcher;
use super::reorder::ReorderBuffer;
use super::workers::pool::{process_batch, WorkerPool};
use super::workers::OutputMsg;
use crate::error::PipelineError;
use crate::fetcher::BatchFetcher;
use crate::registry::{next_pipeline_id, WorkerRegistry};
use crate::source::BatchSource;

/// Iterator over collated batches for one pass over a `BatchSource`.
///
/// Yields `Ok(batch)` in source order, `Err` for a failed batch at the
/// position where it would have been delivered, and `None` once the pass
/// completes. A new iterator is required to run another pass.
pub struct PrefetchIter<S, F: BatchFetcher> {
    inner: IterImpl<S, F>,
    total: usize,
    /// The pass ended normally or was fused by a delivered failure.
    finished: bool,
    /// Teardown has run, for any reason.
    shut_down: bool,
}

enum IterImpl<S, F: BatchFetcher> {
    /// `num_workers == 0`: plain fetch+collate on the consumer thread.
    /// No threads, no channels, no window.
    Sync {
        source: S,
        fetcher: F,
        staging: bool,
        rng: StdRng,
        next_seq: u64,
    },
    Pipelined(Pipeline<S, F::Batch>),
}

/// The concurrent machinery behind one pipelined pass.
struct Pipeline<S, B: Send + 'static> {
    dispatcher: Dispatcher<S>,
    pool: WorkerPool<B>,
    reorder: ReorderBuffer<Result<B>>,
    registry: Arc<WorkerRegistry>,
    pipeline_id: u64,
    timeout: Duration,
    poll_interval: Duration,
    shutdown_done: bool,
}

impl<S, F> PrefetchIter<S, F>
where
    S: BatchSource,
    F: BatchFetcher + Clone + Send + 'static,
{
    pub(crate) fn synchronous(source: S, fetcher: F, staging: bool, base_seed: u64) -> Self {
        let total = source.len();
        Self {
            inner: IterImpl::Sync {
                source,
                fetcher,
                staging,
                rng: StdRng::seed_from_u64(base_seed),
                next_seq: 0,
            },
            total,
            finished: false,
            shut_down: false,
        }
    }

    pub(crate) fn pipelined(
        source: S,
        fetcher: &F,
        config: &PrefetchConfig,
        base_seed: u64,
        registry: Arc<WorkerRegistry>,
    ) -> Result<Self> {
        let total = source.len();
        let window = config.window();

        let (pool, task_txs) = WorkerPool::spawn(
            fetcher,
            config.num_workers,
            window,
            base_seed,
            config.staging,
        )?;

        let pipeline_id = next_pipeline_id();
        registry.register(pipeline_id, (0..config.num_workers).collect());

        let mut pipeline = Pipeline {
            dispatcher: Dispatcher::new(source, task_txs, window),
            pool,
            reorder: ReorderBuffer::new(),
            registry,
            pipeline_id,
            timeout: config.timeout,
            poll_interval: config.poll_interval,
            shutdown_done: false,
        };

        // Prime the window so workers start immediately.
        if let Err(e) = pipeline.dispatcher.prime() {
            pipeline.shutdown();
            return Err(e);
        }

        Ok(Self {
            inner: IterImpl::Pipelined(pipeline),
            total,
            finished: false,
            shut_down: false,
        })
    }

    /// Number of batches in the whole pass.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.total
    }

    /// Batches dispatched to workers but not yet delivered. Always within
    /// the configured window; 0 in synchronous mode.
    pub fn in_flight(&self) -> usize {
        match &self.inner {
            IterImpl::Sync { .. } => 0,
            IterImpl::Pipelined(pipeline) => pipeline.dispatcher.in_flight(),
        }
    }

    /// Tears the pipeline down: stop flag, staging sentinel + join, worker
    /// sentinels + channel close, worker joins, registry unregister — in
    /// that order. Idempotent and safe to call at any point, including
    /// before the first `next()`.
    pub fn shutdown(&mut self) {
        if let IterImpl::Pipelined(pipeline) = &mut self.inner {
            pipeline.shutdown();
        }
        self.shut_down = true;
    }
}

impl<S, F> Iterator for PrefetchIter<S, F>
where
    S: BatchSource,
    F: BatchFetcher + Clone + Send + 'static,
{
    type Item = Result<F::Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.shut_down {
            return Some(Err(PipelineError::ShutdownMisuse.into()));
        }

        match &mut self.inner {
            IterImpl::Sync {
                source,
                fetcher,
                staging,
                rng,
                next_seq,
            } => {
                let indices = match source.next_batch() {
                    Some(indices) => indices,
                    None => {
                        self.finished = true;
                        self.shut_down = true;
                        return None;
                    }
                };
                let seq = *next_seq;
                *next_seq += 1;

                let result = process_batch(fetcher, rng, 0, seq, &indices)
                    .map(|batch| if *staging { fetcher.stage(batch) } else { batch });
                if result.is_err() {
                    self.finished = true;
                    self.shut_down = true;
                }
                Some(result)
            }

            IterImpl::Pipelined(pipeline) => loop {
                // Deliver the expected batch if it has already arrived.
                if let Some(payload) = pipeline.reorder.pop_next() {
                    return match payload {
                        Ok(batch) => {
                            // Refill the window before handing the batch out.
                            if let Err(e) = pipeline.dispatcher.dispatch_next() {
                                pipeline.shutdown();
                                self.shut_down = true;
                                return Some(Err(e));
                            }
                            Some(Ok(batch))
                        }
                        Err(e) => {
                            // A fetch failure surfaces exactly at its
                            // position in the sequence and ends the pass.
                            pipeline.shutdown();
                            self.shut_down = true;
                            self.finished = true;
                            Some(Err(e))
                        }
                    };
                }

                if pipeline.dispatcher.is_drained() {
                    pipeline.shutdown();
                    self.shut_down = true;
                    self.finished = true;
                    return None;
                }

                match pipeline.recv_result() {
                    Ok((seq, payload)) => {
                        pipeline.dispatcher.result_received();
                        pipeline.reorder.insert(seq, payload);
                    }
                    Err(e) => {
                        pipeline.shutdown();
                        self.shut_down = true;
                        return Some(Err(e));
                    }
                }
            },
        }
    }
}

impl<S, B: Send + 'static> Pipeline<S, B> {
    /// Blocking receive wrapped in the failure detector: wakes every
    /// `poll_interval` to check worker and staging liveness, and gives up
    /// once the hard timeout (if configured) elapses.
    fn recv_result(&mut self) -> Result<(u64, Result<B>)> {
        let start = Instant::now();

        loop {
            let wait = if self.timeout.is_zero() {
                self.poll_interval
            } else {
                self.poll_interval
                    .min(self.timeout.saturating_sub(start.elapsed()))
            };

            match self.pool.output().recv_timeout(wait) {
                Ok(OutputMsg::Result { seq, payload }) => return Ok((seq, payload)),
                // The staging sentinel is consumed by the staging thread;
                // seeing it here would mean shutdown already began.
                Ok(OutputMsg::StopStaging) => continue,
                Err(err) => {
                    // Polling is the only death-detection path: a worker
                    // that panicked can never send a result, so the
                    // receive just keeps coming up empty.
                    let dead = self.pool.dead_workers();
                    if !dead.is_empty() {
                        return Err(PipelineError::WorkerDeath { workers: dead }.into());
                    }
                    if self.pool.staging_dead() {
                        return Err(PipelineError::RelayDeath.into());
                    }
                    if matches!(err, RecvTimeoutError::Disconnected) {
                        // With staging on, the consumer listens on the
                        // staged channel, whose only sender lives on the
                        // staging thread: disconnection means that thread
                        // exited, even if the handle has not settled yet.
                        if self.pool.has_staging() {
                            return Err(PipelineError::RelayDeath.into());
                        }
                        return Err(anyhow!("prefetch output channel disconnected"));
                    }
                    if !self.timeout.is_zero() && start.elapsed() >= self.timeout {
                        return Err(PipelineError::Timeout {
                            waited: start.elapsed(),
                        }
                        .into());
                    }
                }
            }
        }
    }

    /// Single-shot teardown. The step order is load-bearing: the staging
    /// thread must be gone before the worker channels close, and the
    /// registry entry must outlive the workers it describes.
    fn shutdown(&mut self) {
        if self.shutdown_done {
            return;
        }
        self.shutdown_done = true;

        self.pool.signal_stop();
        self.pool.stop_staging();
        self.dispatcher.close();
        self.pool.join_workers();
        self.registry.unregister(self.pipeline_id);
        debug!(
            pipeline_id = self.pipeline_id,
            delivered = self.reorder.next_expected(),
            parked = self.reorder.parked(),
            "prefetch pipeline shut down"
        );
    }
}

impl<S, B: Send + 'static> Drop for Pipeline<S, B> {
    fn drop(&mut self) {
        // Best-effort finalizer; explicit shutdown() is still the contract.
        self.shutdown();
    }
}
