//! Dispatch side of the pipeline.
//!
//! The dispatcher is owned by the consumer thread and never touched
//! concurrently. It pulls index-batches from the source in order, stamps
//! each with the next sequence number, and round-robins them across the
//! per-worker input channels while holding the in-flight count inside the
//! window.
//!
//! Round-robin is oblivious to per-worker speed on purpose: a slow worker
//! backs up its own queue but cannot starve the others, and the
//! assignment stays deterministic.

use anyhow::Result;
use crossbeam_channel::Sender;

use super::workers::WorkerTask;
use crate::error::PipelineError;
use crate::source::BatchSource;

pub(crate) struct Dispatcher<S> {
    source: S,
    senders: Vec<Sender<WorkerTask>>,
    window: usize,
    next_seq: u64,
    cursor: usize,
    in_flight: usize,
    exhausted: bool,
}

impl<S> Dispatcher<S> {
    pub(crate) fn new(source: S, senders: Vec<Sender<WorkerTask>>, window: usize) -> Self {
        Self {
            source,
            senders,
            window,
            next_seq: 0,
            cursor: 0,
            in_flight: 0,
            exhausted: false,
        }
    }

    /// Records that one result came off the output channel.
    pub(crate) fn result_received(&mut self) {
        debug_assert!(self.in_flight > 0, "received more results than dispatched");
        self.in_flight -= 1;
    }

    /// True once the source is drained and every dispatched batch has
    /// been received.
    pub(crate) fn is_drained(&self) -> bool {
        self.exhausted && self.in_flight == 0
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Sends the termination sentinel to every worker and drops the input
    /// senders, closing the channels. Safe against workers that already
    /// died: a refused sentinel just means nobody is listening.
    pub(crate) fn close(&mut self) {
        for sender in &self.senders {
            let _ = sender.send(WorkerTask::Shutdown);
        }
        self.senders.clear();
    }
}

impl<S: BatchSource> Dispatcher<S> {
    /// Fills the window at pipeline start.
    pub(crate) fn prime(&mut self) -> Result<()> {
        for _ in 0..self.window {
            if !self.dispatch_next()? {
                break;
            }
        }
        Ok(())
    }

    /// Dispatches one more index-batch if the source has one and the
    /// window has room. Returns whether a task went out; `false` with a
    /// drained source is the "source exhausted" no-op.
    pub(crate) fn dispatch_next(&mut self) -> Result<bool> {
        if self.exhausted || self.in_flight >= self.window {
            return Ok(false);
        }

        let indices = match self.source.next_batch() {
            Some(indices) => indices,
            None => {
                self.exhausted = true;
                return Ok(false);
            }
        };

        let seq = self.next_seq;
        let worker_id = self.cursor;
        // A worker only drops its receiver when its thread exits, so a
        // refused send means that worker is dead, whether or not the
        // liveness poll has noticed yet.
        self.senders[worker_id]
            .send(WorkerTask::Batch { seq, indices })
            .map_err(|_| PipelineError::WorkerDeath {
                workers: vec![worker_id],
            })?;

        self.next_seq += 1;
        self.cursor = (self.cursor + 1) % self.senders.len();
        self.in_flight += 1;
        Ok(true)
    }
}
