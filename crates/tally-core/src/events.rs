//! Service events and pipeline counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tally_store::ItemId;
use uuid::Uuid;

/// Correlates a mutation request with its outcome events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationId(Uuid);

impl MutationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Destroy,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Create => f.write_str("create"),
            MutationKind::Destroy => f.write_str("destroy"),
        }
    }
}

/// What caused a refetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerSource {
    Created,
    Destroyed,
    Refresh,
}

impl From<MutationKind> for TriggerSource {
    fn from(kind: MutationKind) -> Self {
        match kind {
            MutationKind::Create => TriggerSource::Created,
            MutationKind::Destroy => TriggerSource::Destroyed,
        }
    }
}

/// Notifications published by the service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// The store accepted a mutation; `refetch` is the trigger it issued.
    MutationSucceeded {
        id: MutationId,
        kind: MutationKind,
        item: ItemId,
        refetch: u64,
    },
    /// The store rejected a mutation. No refetch was issued for it.
    MutationFailed {
        id: MutationId,
        kind: MutationKind,
        error: String,
    },
    /// A fetch result became the current snapshot.
    SnapshotApplied { seq: u64, items: usize },
    /// A fetch completed after a newer one had been applied.
    FetchDiscarded { seq: u64, applied: u64 },
    /// A fetch failed; the current snapshot was kept.
    FetchFailed { seq: u64, error: String },
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Triggers issued; each one starts exactly one fetch.
    pub triggers: u64,
    pub applied: u64,
    pub discarded: u64,
    pub failed: u64,
}

impl PipelineStats {
    /// Fetches that have not completed yet.
    pub fn in_flight(&self) -> u64 {
        self.triggers
            .saturating_sub(self.applied + self.discarded + self.failed)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) triggers: AtomicU64,
    pub(crate) applied: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) failed: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            triggers: self.triggers.load(Ordering::SeqCst),
            applied: self.applied.load(Ordering::SeqCst),
            discarded: self.discarded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}
