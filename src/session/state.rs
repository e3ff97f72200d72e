//! Lifecycle state and the outstanding-write ledger.

use std::collections::HashSet;

/// Connection lifecycle. Single-shot: states advance left to right and
/// never revisit an earlier phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Before the resolution request is issued.
    Start,
    /// Hostname resolution in flight.
    Resolving,
    /// TCP connect in flight.
    Connecting,
    /// Live session: reads armed, protocol engine running, input relayed.
    Connected,
    /// The remote closed the connection; the loop is done.
    Closed,
}

/// Tracks buffers handed to the link layer for writing.
///
/// A buffer id is issued on submission and retired exactly once by the
/// matching write completion. A completion for an id that is not
/// outstanding means the link adapter broke its contract, and that is not
/// recoverable.
#[derive(Debug, Default)]
pub struct WriteLedger {
    next_id: u64,
    outstanding: HashSet<u64>,
}

impl WriteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new submission and return its id.
    pub fn issue(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.outstanding.insert(id);
        id
    }

    /// Retire a completed write.
    ///
    /// # Panics
    /// If `id` was never issued or was already released.
    pub fn release(&mut self, id: u64) {
        if !self.outstanding.remove(&id) {
            panic!("write completion for unknown or already released buffer {id}");
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}
