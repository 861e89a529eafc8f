//! Worker-identity bookkeeping for liveness reporting.
//!
//! Each pipeline pass registers its worker ids under a unique pipeline id
//! when the pool is spawned and unregisters them exactly once during
//! shutdown. Keeping this an explicit, injectable collaborator (instead of
//! an ambient global table) lets several loaders share one registry and
//! lets tests observe the register/unregister contract.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(0);

/// Mints a process-unique pipeline id.
pub(crate) fn next_pipeline_id() -> u64 {
    NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Maps live pipeline ids to the worker ids they spawned.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    inner: Mutex<HashMap<u64, Vec<usize>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the workers belonging to one pipeline pass.
    pub fn register(&self, pipeline_id: u64, worker_ids: Vec<usize>) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        inner.insert(pipeline_id, worker_ids);
    }

    /// Removes a pipeline's workers. Safe to call for an unknown id.
    pub fn unregister(&self, pipeline_id: u64) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        inner.remove(&pipeline_id);
    }

    /// Worker ids currently registered for a pipeline, if any.
    pub fn workers(&self, pipeline_id: u64) -> Option<Vec<usize>> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.get(&pipeline_id).cloned()
    }

    /// Number of pipelines currently registered.
    pub fn active_pipelines(&self) -> usize {
        self.inner.lock().expect("registry lock poisoned").len()
    }
}
