//! Worker-side types for the prefetch pipeline.
//!
//! - `pool`: worker pool, per-worker loop, and the optional staging thread
//!
//! Workers communicate over channels: tasks flow in on per-worker input
//! channels and tagged results flow out on one shared output channel.
//! Distinguished sentinel values, not channel closure, signal "no more
//! work", so teardown never races a thread that is still sending.

pub(crate) mod pool;

use anyhow::Result;

/// Work sent to exactly one worker. Ownership transfers on send.
#[derive(Debug)]
pub(crate) enum WorkerTask {
    /// Fetch and collate the indices for the batch with this sequence
    /// number.
    Batch { seq: u64, indices: Vec<usize> },
    /// Terminate the worker loop cleanly.
    Shutdown,
}

/// Message on the shared output channel (and the staged channel behind it).
pub(crate) enum OutputMsg<B> {
    /// One finished batch, success or failure, tagged with its sequence
    /// number. Exactly one is produced per dispatched task.
    Result { seq: u64, payload: Result<B> },
    /// Terminate the staging thread. Sent only by the shutdown
    /// coordinator; never reaches the consumer.
    StopStaging,
}
