//! Mutation intake.
//!
//! Create and destroy requests are commands dispatched to their own task.
//! A successful command posts one refetch trigger; a failed one is logged and
//! reported as an event, and the pipeline never sees it.

use std::sync::Arc;

use tally_store::{Item, ItemId, NewItem, ResourceAdapter, StoreError};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, trace, warn};

use crate::error::CoreError;
use crate::events::{MutationId, MutationKind, ServiceEvent};
use crate::pipeline::{FetchOutcome, PipelineHandle};

/// A mutation request.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create(NewItem),
    Destroy(Item),
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Create(_) => MutationKind::Create,
            Mutation::Destroy(_) => MutationKind::Destroy,
        }
    }

    async fn execute(self, adapter: &dyn ResourceAdapter) -> Result<ItemId, StoreError> {
        match self {
            Mutation::Create(record) => adapter.create(record).await.map(|item| item.id),
            Mutation::Destroy(item) => adapter.destroy(item).await.map(|item| item.id),
        }
    }
}

/// The refetch a successful mutation triggered.
#[derive(Debug)]
pub(crate) struct Refetch {
    pub(crate) seq: u64,
    pub(crate) outcome: oneshot::Receiver<FetchOutcome>,
}

/// Where a mutation task reports how it ended.
type Receipt = oneshot::Sender<Result<Refetch, CoreError>>;

/// Dispatches mutations against the adapter.
#[derive(Clone)]
pub struct MutationIntake {
    adapter: Arc<dyn ResourceAdapter>,
    pipeline: PipelineHandle,
    events: broadcast::Sender<ServiceEvent>,
}

impl MutationIntake {
    pub(crate) fn new(
        adapter: Arc<dyn ResourceAdapter>,
        pipeline: PipelineHandle,
        events: broadcast::Sender<ServiceEvent>,
    ) -> Self {
        Self {
            adapter,
            pipeline,
            events,
        }
    }

    /// Start a mutation in the background.
    pub fn dispatch(&self, mutation: Mutation) -> MutationId {
        let (receipt, _) = oneshot::channel();
        self.spawn(mutation, receipt)
    }

    /// Start a mutation and get its refetch, or the reason there is none,
    /// without going through the event broadcast.
    pub(crate) fn dispatch_tracked(
        &self,
        mutation: Mutation,
    ) -> (MutationId, oneshot::Receiver<Result<Refetch, CoreError>>) {
        let (receipt, rx) = oneshot::channel();
        (self.spawn(mutation, receipt), rx)
    }

    fn spawn(&self, mutation: Mutation, receipt: Receipt) -> MutationId {
        let id = MutationId::new();
        let intake = self.clone();
        trace!(mutation_id = %id, kind = %mutation.kind(), "dispatching mutation");
        tokio::spawn(async move {
            let result = intake.run(id, mutation).await;
            let _ = receipt.send(result);
        });
        id
    }

    async fn run(self, id: MutationId, mutation: Mutation) -> Result<Refetch, CoreError> {
        let kind = mutation.kind();

        let item = match mutation.execute(self.adapter.as_ref()).await {
            Ok(item) => item,
            Err(e) => {
                warn!(mutation_id = %id, %kind, error = %e, "mutation failed");
                let message = e.to_string();
                self.emit(ServiceEvent::MutationFailed {
                    id,
                    kind,
                    error: message.clone(),
                });
                return Err(CoreError::Mutation { kind, message });
            }
        };

        match self.pipeline.trigger_tracked(kind.into()) {
            Ok((seq, outcome)) => {
                debug!(mutation_id = %id, %kind, item = %item, refetch = seq, "mutation applied");
                self.emit(ServiceEvent::MutationSucceeded {
                    id,
                    kind,
                    item,
                    refetch: seq,
                });
                Ok(Refetch { seq, outcome })
            }
            Err(e) => {
                debug!(mutation_id = %id, %kind, error = %e, "mutation applied after shutdown, no refetch");
                Err(e)
            }
        }
    }

    fn emit(&self, event: ServiceEvent) {
        if self.events.send(event).is_err() {
            trace!("no subscribers for service event");
        }
    }
}
