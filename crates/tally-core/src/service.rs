//! The item service: composition root of the reactive core.

use std::sync::{Arc, Mutex, PoisonError};

use tally_store::{Item, NewItem, Query, ResourceAdapter};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::config::ServiceConfig;
use crate::error::CoreError;
use crate::events::{Counters, MutationId, PipelineStats, ServiceEvent, TriggerSource};
use crate::filter::FilteredView;
use crate::intake::{Mutation, MutationIntake};
use crate::pipeline::{FetchOutcome, PipelineHandle, RefetchPipeline, SnapshotCache};
use crate::replay::Subscription;
use crate::snapshot::Snapshot;

/// A live, sorted view of the item collection plus the mutations that
/// change it.
///
/// Create one per application and share it by reference; every clone of a
/// subscription observes the same snapshot.
pub struct ItemService {
    config: ServiceConfig,
    adapter: Arc<dyn ResourceAdapter>,
    cache: Arc<SnapshotCache>,
    pipeline: PipelineHandle,
    intake: MutationIntake,
    events: broadcast::Sender<ServiceEvent>,
    counters: Arc<Counters>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ItemService {
    /// Start a service over `adapter`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(adapter: Arc<dyn ResourceAdapter>, config: ServiceConfig) -> Self {
        let cache = Arc::new(SnapshotCache::new());
        let counters = Arc::new(Counters::default());
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let (pipeline, handle) = RefetchPipeline::new(
            Arc::clone(&adapter),
            config.view_query.clone(),
            Arc::clone(&cache),
            events.clone(),
            Arc::clone(&counters),
        );
        let task = tokio::spawn(pipeline.run());
        let intake = MutationIntake::new(Arc::clone(&adapter), handle.clone(), events.clone());

        debug!(refresh_on_items = config.refresh_on_items, "item service started");

        Self {
            config,
            adapter,
            cache,
            pipeline: handle,
            intake,
            events,
            counters,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn builder(adapter: Arc<dyn ResourceAdapter>) -> ItemServiceBuilder {
        ItemServiceBuilder::new(adapter)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The live view: replays the current snapshot, then every later one.
    ///
    /// Unless disabled in [`ServiceConfig::refresh_on_items`], every call also
    /// issues a refresh, so each caller primes the view on activation.
    pub fn items(&self) -> Subscription<Arc<Snapshot>> {
        let subscription = self.cache.subscribe();
        if self.config.refresh_on_items {
            self.refresh();
        }
        subscription
    }

    /// The live view without the refresh side effect.
    pub fn subscribe(&self) -> Subscription<Arc<Snapshot>> {
        self.cache.subscribe()
    }

    /// The current snapshot, if any fetch has been applied.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.cache.current()
    }

    /// Request an authoritative refetch.
    pub fn refresh(&self) {
        if let Err(e) = self.pipeline.trigger(TriggerSource::Refresh) {
            debug!(error = %e, "refresh ignored");
        }
    }

    /// Create an item. Failures are reported as [`ServiceEvent::MutationFailed`].
    pub fn create(&self, record: NewItem) {
        self.intake.dispatch(Mutation::Create(record));
    }

    /// Destroy an item. Failures are reported as [`ServiceEvent::MutationFailed`].
    pub fn destroy(&self, item: Item) {
        self.intake.dispatch(Mutation::Destroy(item));
    }

    /// Dispatch a mutation, returning the id its events are tagged with.
    pub fn dispatch(&self, mutation: Mutation) -> MutationId {
        self.intake.dispatch(mutation)
    }

    /// Dispatch a mutation and wait until the view reflects it.
    ///
    /// Resolves with the first snapshot applied at or after the mutation's
    /// refetch. Does not depend on [`events`](Self::events), so a lagging
    /// event buffer cannot stall it.
    pub async fn apply(&self, mutation: Mutation) -> Result<Arc<Snapshot>, CoreError> {
        if self.pipeline.is_closed() {
            return Err(CoreError::Closed);
        }
        let (id, receipt) = self.intake.dispatch_tracked(mutation);
        let refetch = receipt.await.map_err(|_| CoreError::Closed)??;
        trace!(mutation_id = %id, refetch = refetch.seq, "waiting for refetch");

        match refetch.outcome.await {
            Ok(FetchOutcome::Applied | FetchOutcome::Discarded { .. }) => self
                .cache
                .current()
                .filter(|snapshot| snapshot.sequence >= refetch.seq)
                .ok_or(CoreError::Closed),
            Ok(FetchOutcome::Failed(message)) => Err(CoreError::Fetch {
                seq: refetch.seq,
                message,
            }),
            Err(_) => Err(CoreError::Closed),
        }
    }

    /// A new filtered view, independent of the shared snapshot.
    pub fn filtered(&self) -> FilteredView {
        FilteredView::new(Arc::clone(&self.adapter))
    }

    /// Subscribe to service events.
    pub fn events(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Stop the pipeline, wait for in-flight fetches, and end every
    /// subscription. The last snapshot stays readable through
    /// [`current`](Self::current).
    pub async fn shutdown(&self) {
        self.pipeline.shutdown();

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!(error = %e, "refetch pipeline task failed");
        }

        self.cache.close();
        debug!(stats = ?self.stats(), "item service stopped");
    }
}

impl Drop for ItemService {
    fn drop(&mut self) {
        self.pipeline.shutdown();
    }
}

/// Builder for an [`ItemService`].
pub struct ItemServiceBuilder {
    adapter: Arc<dyn ResourceAdapter>,
    config: ServiceConfig,
}

impl ItemServiceBuilder {
    pub fn new(adapter: Arc<dyn ResourceAdapter>) -> Self {
        Self {
            adapter,
            config: ServiceConfig::default(),
        }
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn refresh_on_items(mut self, refresh: bool) -> Self {
        self.config.refresh_on_items = refresh;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Track a subset of the collection instead of all of it.
    pub fn view_query(mut self, query: Query) -> Self {
        self.config.view_query = query;
        self
    }

    /// Start the service. Must be called from within a Tokio runtime.
    pub fn start(self) -> ItemService {
        ItemService::start(self.adapter, self.config)
    }
}
