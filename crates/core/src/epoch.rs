//! Generation counter for discarding superseded work
//!
//! Every opened document captures an [`EpochTicket`]. Selecting a new
//! document advances the shared [`Epoch`], after which all tickets issued
//! before the advance report themselves as superseded. Work holding a stale
//! ticket must drop its results instead of publishing them.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Shared generation counter
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct Epoch {
    generation: Arc<AtomicU64>,
}

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Start a new generation and return a ticket for it
    ///
    /// Every ticket issued earlier becomes superseded.
    pub fn advance(&self) -> EpochTicket {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        EpochTicket { generation, epoch: self.clone() }
    }

    /// Ticket for the current generation without advancing
    pub fn ticket(&self) -> EpochTicket {
        EpochTicket { generation: self.current(), epoch: self.clone() }
    }
}

/// A captured generation
#[derive(Debug, Clone)]
pub struct EpochTicket {
    generation: u64,
    epoch: Epoch,
}

impl EpochTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer generation has started since this ticket was issued
    pub fn is_current(&self) -> bool {
        self.epoch.current() == self.generation
    }

    pub fn is_superseded(&self) -> bool {
        !self.is_current()
    }
}

impl PartialEq for EpochTicket {
    fn eq(&self, other: &Self) -> bool {
        self.generation == other.generation
            && Arc::ptr_eq(&self.epoch.generation, &other.epoch.generation)
    }
}

impl Eq for EpochTicket {}
