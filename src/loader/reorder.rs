//! Consumer-side reorder buffer.
//!
//! Workers complete out of order; delivery must not. Early arrivals are
//! parked in a map keyed by sequence number until the cursor reaches them.
//! The buffer never holds more than one window's worth of entries because
//! the dispatcher refuses to run further ahead than that.

use std::collections::HashMap;

/// Restores strict sequence-number order from out-of-order arrivals.
///
/// Invariant: every parked key is >= `next_expected`; an entry is removed
/// the instant its sequence number matches the cursor.
pub(crate) struct ReorderBuffer<T> {
    pending: HashMap<u64, T>,
    next_expected: u64,
}

impl<T> ReorderBuffer<T> {
    pub(crate) fn new() -> Self {
        Self {
            pending: HashMap::new(),
            next_expected: 0,
        }
    }

    /// Parks an arrival. Sequence numbers are unique per pass, so a
    /// duplicate or an already-delivered number is a dispatcher bug.
    pub(crate) fn insert(&mut self, seq: u64, value: T) {
        debug_assert!(seq >= self.next_expected, "arrival {seq} already delivered");
        let prev = self.pending.insert(seq, value);
        debug_assert!(prev.is_none(), "duplicate arrival for sequence {seq}");
    }

    /// Pops the entry the consumer is waiting for, if it has arrived,
    /// and advances the cursor past it.
    pub(crate) fn pop_next(&mut self) -> Option<T> {
        let value = self.pending.remove(&self.next_expected)?;
        self.next_expected += 1;
        Some(value)
    }

    /// The sequence number the consumer is waiting for.
    pub(crate) fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Number of parked early arrivals.
    pub(crate) fn parked(&self) -> usize {
        self.pending.len()
    }
}
