//! Worker pool for parallel batch loading.
//!
//! Manages worker lifecycle and communication:
//! - Per-worker input channels: consumer thread -> workers (dispatch)
//! - Shared output channel: workers -> consumer (result collection)
//! - Optional staging thread between the two for `BatchFetcher::stage`
//! - Stop flag + sentinels for deterministic teardown
//!
//! Input channels are unbounded: the dispatch window already caps how many
//! tasks can be outstanding, and an unbounded send means teardown can
//! never block against a full queue. The output channel is bounded to one
//! window (plus the staging sentinel slot), which is exactly the most that
//! can ever be in it.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

use super::{OutputMsg, WorkerTask};
use crate::fetcher::BatchFetcher;

/// The optional staging stage: one thread relaying worker output to the
/// consumer through `BatchFetcher::stage`.
struct Staging<B> {
    handle: thread::JoinHandle<()>,
    staged_rx: Receiver<OutputMsg<B>>,
}

/// Fixed-size pool of worker threads plus the optional staging thread.
pub(crate) struct WorkerPool<B> {
    handles: Vec<thread::JoinHandle<()>>,
    /// Consumer-side end of the shared output channel.
    output_rx: Receiver<OutputMsg<B>>,
    /// Kept so the shutdown coordinator can send the staging sentinel.
    output_tx: Sender<OutputMsg<B>>,
    staging: Option<Staging<B>>,
    stop: Arc<AtomicBool>,
    workers_joined: bool,
}

impl<B: Send + 'static> WorkerPool<B> {
    /// Spawns `num_workers` workers (and the staging thread if asked for),
    /// each owning a clone of `fetcher`. Returns the pool and the
    /// per-worker task senders for the dispatcher.
    pub(crate) fn spawn<F>(
        fetcher: &F,
        num_workers: usize,
        window: usize,
        base_seed: u64,
        staging: bool,
    ) -> Result<(Self, Vec<Sender<WorkerTask>>)>
    where
        F: BatchFetcher<Batch = B> + Clone + Send + 'static,
    {
        // One slot per in-flight result, one for the staging sentinel.
        let (output_tx, output_rx) = bounded(window + 1);
        let stop = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(num_workers);
        let mut task_txs = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (task_tx, task_rx) = unbounded();
            let fetcher = fetcher.clone();
            let output_tx = output_tx.clone();
            let stop = stop.clone();
            let seed = base_seed.wrapping_add(worker_id as u64);

            let handle = thread::Builder::new()
                .name(format!("prefetch-worker-{worker_id}"))
                .spawn(move || worker_loop(fetcher, worker_id, seed, task_rx, output_tx, stop))
                .with_context(|| format!("failed to spawn prefetch worker {worker_id}"))?;

            handles.push(handle);
            task_txs.push(task_tx);
        }

        let staging = if staging {
            let (staged_tx, staged_rx) = bounded(window + 1);
            let fetcher = fetcher.clone();
            let input_rx = output_rx.clone();

            let handle = thread::Builder::new()
                .name("prefetch-staging".to_string())
                .spawn(move || staging_loop(fetcher, input_rx, staged_tx))
                .context("failed to spawn staging thread")?;

            Some(Staging { handle, staged_rx })
        } else {
            None
        };

        let pool = Self {
            handles,
            output_rx,
            output_tx,
            staging,
            stop,
            workers_joined: false,
        };
        Ok((pool, task_txs))
    }

    /// The channel the consumer should receive results from: the staged
    /// channel when staging is on, the shared output channel otherwise.
    pub(crate) fn output(&self) -> &Receiver<OutputMsg<B>> {
        match &self.staging {
            Some(staging) => &staging.staged_rx,
            None => &self.output_rx,
        }
    }

    /// Ids of workers that have terminated without being told to.
    /// Meaningful only before the pool is torn down.
    pub(crate) fn dead_workers(&self) -> Vec<usize> {
        if self.workers_joined {
            return Vec::new();
        }
        self.handles
            .iter()
            .enumerate()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(id, _)| id)
            .collect()
    }

    /// Whether the staging thread has terminated while still installed.
    pub(crate) fn staging_dead(&self) -> bool {
        self.staging
            .as_ref()
            .is_some_and(|staging| staging.handle.is_finished())
    }

    /// Whether this pool routes results through a staging thread.
    pub(crate) fn has_staging(&self) -> bool {
        self.staging.is_some()
    }

    /// Raises the stop flag observed by workers between tasks.
    pub(crate) fn signal_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stops and joins the staging thread. Must run before the worker
    /// input channels are closed: a dying worker may leave unread data on
    /// the shared output channel, and the staging thread has to drain past
    /// it rather than observe a half-closed channel.
    pub(crate) fn stop_staging(&mut self) {
        if let Some(staging) = self.staging.take() {
            // The send only fails if the staging thread is already gone,
            // in which case there is nothing left to wake.
            let _ = self.output_tx.send(OutputMsg::StopStaging);
            if staging.handle.join().is_err() {
                warn!("staging thread panicked during shutdown");
            }
        }
    }

    /// Joins every worker to completion. Sentinels must already have been
    /// sent and the input senders dropped.
    pub(crate) fn join_workers(&mut self) {
        for (worker_id, handle) in self.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                warn!(worker_id, "prefetch worker panicked before shutdown");
            }
        }
        self.workers_joined = true;
        debug!("prefetch worker pool joined");
    }
}

/// Per-worker loop: receive one task, fetch+collate it as one atomic unit,
/// emit the tagged result, repeat. A fetch or collate error becomes a
/// failure payload for that sequence number; it never ends the loop.
fn worker_loop<F>(
    mut fetcher: F,
    worker_id: usize,
    seed: u64,
    task_rx: Receiver<WorkerTask>,
    output_tx: Sender<OutputMsg<F::Batch>>,
    stop: Arc<AtomicBool>,
) where
    F: BatchFetcher,
{
    let mut rng = StdRng::seed_from_u64(seed);

    loop {
        // Disconnect means the dispatcher is gone; treat it like the
        // sentinel.
        let task = match task_rx.recv() {
            Ok(task) => task,
            Err(_) => break,
        };

        match task {
            WorkerTask::Shutdown => break,
            WorkerTask::Batch { seq, indices } => {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                let payload = process_batch(&mut fetcher, &mut rng, worker_id, seq, &indices);
                if output_tx.send(OutputMsg::Result { seq, payload }).is_err() {
                    break;
                }
            }
        }
    }
}

/// One batch: scale selection (if the fetcher has scales), then fetch each
/// index, then collate. The selected scale holds for the whole unit.
/// Also used directly by the synchronous (zero-worker) path.
pub(crate) fn process_batch<F>(
    fetcher: &mut F,
    rng: &mut StdRng,
    worker_id: usize,
    seq: u64,
    indices: &[usize],
) -> Result<F::Batch>
where
    F: BatchFetcher,
{
    let num_scales = fetcher.num_scales();
    if num_scales > 1 {
        fetcher.set_scale(rng.random_range(0..num_scales));
    }

    let items = indices
        .iter()
        .map(|&index| {
            fetcher
                .fetch(index)
                .with_context(|| format!("worker {worker_id} failed to fetch index {index}"))
        })
        .collect::<Result<Vec<_>>>()?;

    fetcher
        .collate(items)
        .with_context(|| format!("worker {worker_id} failed to collate batch {seq}"))
}

/// Staging loop: strictly sequential relay from the shared output channel
/// to the staged channel, applying `stage` to successful payloads.
fn staging_loop<F>(
    mut fetcher: F,
    input_rx: Receiver<OutputMsg<F::Batch>>,
    staged_tx: Sender<OutputMsg<F::Batch>>,
) where
    F: BatchFetcher,
{
    while let Ok(msg) = input_rx.recv() {
        match msg {
            OutputMsg::StopStaging => break,
            OutputMsg::Result { seq, payload } => {
                let payload = payload.map(|batch| fetcher.stage(batch));
                if staged_tx.send(OutputMsg::Result { seq, payload }).is_err() {
                    break;
                }
            }
        }
    }
}
