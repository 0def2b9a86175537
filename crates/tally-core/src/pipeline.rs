//! Merge/refetch pipeline actor.
//!
//! Mutation completions and refresh requests arrive on one channel as
//! payload-free triggers. Each trigger carries a sequence number assigned when
//! it is issued and starts exactly one authoritative fetch of the collection.
//! Fetches run concurrently and may complete in any order; a result is applied
//! to the replay cache only if no higher-numbered result has been applied, so
//! the view converges on the latest trigger and never moves backwards.
//!
//! Failures are contained to the fetch that hit them. The actor itself only
//! stops on [`PipelineHandle::shutdown`] or when every handle is dropped.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tally_store::{FindAllOptions, Query, ResourceAdapter};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, trace, warn};

use crate::error::CoreError;
use crate::events::{Counters, ServiceEvent, TriggerSource};
use crate::replay::{Publish, ReplayCache};
use crate::snapshot::Snapshot;
use crate::sort::sort_items;

/// The cache type the pipeline writes to.
pub type SnapshotCache = ReplayCache<Arc<Snapshot>>;

/// How the fetch for one trigger ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The result became the current snapshot.
    Applied,
    /// A newer result had already been applied.
    Discarded { applied: u64 },
    /// The store read failed; the current snapshot was kept.
    Failed(String),
}

/// Operations that can be sent to the pipeline.
#[derive(Debug)]
pub enum PipelineOp {
    /// Fetch the collection for trigger `seq`, reporting the outcome to
    /// `done` if present.
    Trigger {
        seq: u64,
        source: TriggerSource,
        done: Option<oneshot::Sender<FetchOutcome>>,
    },
    /// Stop accepting triggers and wait for in-flight fetches.
    Shutdown,
}

/// Everything a single fetch needs, shared by all fetch tasks.
struct FetchContext {
    adapter: Arc<dyn ResourceAdapter>,
    query: Query,
    cache: Arc<SnapshotCache>,
    events: broadcast::Sender<ServiceEvent>,
    counters: Arc<Counters>,
}

impl FetchContext {
    fn emit(&self, event: ServiceEvent) {
        if self.events.send(event).is_err() {
            trace!("no subscribers for service event");
        }
    }

    async fn fetch(&self, seq: u64, source: TriggerSource) -> FetchOutcome {
        trace!(seq, ?source, "starting authoritative fetch");

        let items = match self
            .adapter
            .find_all(&self.query, FindAllOptions::authoritative())
            .await
        {
            Ok(items) => items,
            Err(e) => {
                Counters::bump(&self.counters.failed);
                warn!(seq, ?source, error = %e, "authoritative fetch failed, keeping current snapshot");
                let error = e.to_string();
                self.emit(ServiceEvent::FetchFailed {
                    seq,
                    error: error.clone(),
                });
                return FetchOutcome::Failed(error);
            }
        };

        let snapshot = Arc::new(Snapshot::new(seq, sort_items(items)));
        let count = snapshot.len();

        match self.cache.publish_if_newer(seq, snapshot) {
            Publish::Applied => {
                Counters::bump(&self.counters.applied);
                debug!(seq, items = count, "applied snapshot");
                self.emit(ServiceEvent::SnapshotApplied { seq, items: count });
                FetchOutcome::Applied
            }
            Publish::Stale { applied } => {
                Counters::bump(&self.counters.discarded);
                debug!(seq, applied, "discarding stale fetch result");
                self.emit(ServiceEvent::FetchDiscarded { seq, applied });
                FetchOutcome::Discarded { applied }
            }
        }
    }
}

/// The pipeline actor.
pub struct RefetchPipeline {
    context: Arc<FetchContext>,
    op_rx: mpsc::UnboundedReceiver<PipelineOp>,
    in_flight: JoinSet<()>,
}

impl RefetchPipeline {
    /// Create a pipeline fetching `query` from `adapter` into `cache`.
    ///
    /// Returns the actor and a handle for issuing triggers.
    pub(crate) fn new(
        adapter: Arc<dyn ResourceAdapter>,
        query: Query,
        cache: Arc<SnapshotCache>,
        events: broadcast::Sender<ServiceEvent>,
        counters: Arc<Counters>,
    ) -> (Self, PipelineHandle) {
        let (op_tx, op_rx) = mpsc::unbounded_channel();
        let context = Arc::new(FetchContext {
            adapter,
            query,
            cache,
            events,
            counters: Arc::clone(&counters),
        });

        let pipeline = Self {
            context,
            op_rx,
            in_flight: JoinSet::new(),
        };
        let handle = PipelineHandle { op_tx, counters };
        (pipeline, handle)
    }

    /// Run the pipeline event loop.
    pub async fn run(mut self) {
        debug!("refetch pipeline started");

        loop {
            tokio::select! {
                op = self.op_rx.recv() => match op {
                    Some(PipelineOp::Trigger { seq, source, done }) => {
                        self.spawn_fetch(seq, source, done);
                    }
                    Some(PipelineOp::Shutdown) => {
                        debug!("refetch pipeline received shutdown");
                        break;
                    }
                    None => {
                        debug!("all pipeline handles dropped");
                        break;
                    }
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "fetch task panicked");
                    }
                }
            }
        }

        // Triggers already accepted still get their fetch; later ones are
        // rejected by the closed channel.
        self.op_rx.close();
        while let Some(op) = self.op_rx.recv().await {
            if let PipelineOp::Trigger { seq, source, done } = op {
                self.spawn_fetch(seq, source, done);
            }
        }

        // Let in-flight fetches land so their results are not lost.
        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "fetch task panicked");
            }
        }

        debug!("refetch pipeline stopped");
    }

    fn spawn_fetch(
        &mut self,
        seq: u64,
        source: TriggerSource,
        done: Option<oneshot::Sender<FetchOutcome>>,
    ) {
        let context = Arc::clone(&self.context);
        self.in_flight.spawn(async move {
            let outcome = context.fetch(seq, source).await;
            if let Some(done) = done {
                let _ = done.send(outcome);
            }
        });
    }
}

/// Handle for issuing triggers to the pipeline.
///
/// Cheaply cloneable; triggers never block.
#[derive(Clone)]
pub struct PipelineHandle {
    op_tx: mpsc::UnboundedSender<PipelineOp>,
    counters: Arc<Counters>,
}

impl PipelineHandle {
    /// Issue a trigger, returning its sequence number.
    pub fn trigger(&self, source: TriggerSource) -> Result<u64, CoreError> {
        self.send_trigger(source, None)
    }

    /// Issue a trigger and get notified when its fetch ends.
    pub fn trigger_tracked(
        &self,
        source: TriggerSource,
    ) -> Result<(u64, oneshot::Receiver<FetchOutcome>), CoreError> {
        let (done, outcome) = oneshot::channel();
        let seq = self.send_trigger(source, Some(done))?;
        Ok((seq, outcome))
    }

    fn send_trigger(
        &self,
        source: TriggerSource,
        done: Option<oneshot::Sender<FetchOutcome>>,
    ) -> Result<u64, CoreError> {
        if self.op_tx.is_closed() {
            return Err(CoreError::Closed);
        }

        let seq = self.counters.triggers.fetch_add(1, Ordering::SeqCst) + 1;
        if self
            .op_tx
            .send(PipelineOp::Trigger { seq, source, done })
            .is_err()
        {
            // Closed since the check above; the trigger never counted.
            self.counters.triggers.fetch_sub(1, Ordering::SeqCst);
            return Err(CoreError::Closed);
        }
        trace!(seq, ?source, "trigger issued");
        Ok(seq)
    }

    /// Ask the pipeline to stop.
    pub fn shutdown(&self) {
        if self.op_tx.send(PipelineOp::Shutdown).is_err() {
            trace!("pipeline already stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.op_tx.is_closed()
    }
}
