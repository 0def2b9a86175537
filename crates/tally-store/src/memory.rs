//! In-process [`Backend`] used by tests and the offline demo.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use crate::{Backend, Function, FunctionId, Item, ItemId, NewItem, Query, StoreError};

const MEMORY_RESOURCE: &str = "items";

/// An item store held in memory.
///
/// Behaves like a remote store: it validates submissions, assigns ids and
/// resolves each item's function. It can be taken offline and slowed down
/// to exercise failure and latency handling.
pub struct MemoryBackend {
    items: RwLock<Vec<Item>>,
    functions: RwLock<HashMap<FunctionId, Function>>,
    offline: AtomicBool,
    latency: Duration,
    queries: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            functions: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
            latency: Duration::ZERO,
            queries: AtomicUsize::new(0),
        }
    }

    /// Create a store that knows the given functions.
    pub fn with_functions(functions: impl IntoIterator<Item = Function>) -> Self {
        let table = functions.into_iter().map(|f| (f.id.clone(), f)).collect();
        Self {
            functions: RwLock::new(table),
            ..Self::new()
        }
    }

    /// Delay every operation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Register a function.
    pub async fn add_function(&self, function: Function) {
        self.functions
            .write()
            .await
            .insert(function.id.clone(), function);
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Current contents, in insertion order.
    pub async fn items(&self) -> Vec<Item> {
        self.items.read().await.clone()
    }

    /// Store an item directly, ignoring latency and the offline switch.
    pub async fn insert(&self, record: NewItem) -> Result<Item, StoreError> {
        let item = self.resolve(&record).await?;
        self.items.write().await.push(item.clone());
        Ok(item)
    }

    /// Remove an item directly, ignoring latency and the offline switch.
    pub async fn remove(&self, id: &ItemId) -> Result<Item, StoreError> {
        let mut items = self.items.write().await;
        let index = items
            .iter()
            .position(|i| &i.id == id)
            .ok_or_else(|| StoreError::NotFound {
                resource: MEMORY_RESOURCE.to_string(),
                id: id.to_string(),
            })?;
        Ok(items.remove(index))
    }

    async fn resolve(&self, record: &NewItem) -> Result<Item, StoreError> {
        record.validate().map_err(StoreError::Validation)?;

        let function = self
            .functions
            .read()
            .await
            .get(&record.function_id)
            .cloned()
            .ok_or_else(|| {
                StoreError::Validation(format!("unknown functionId: {}", record.function_id))
            })?;

        Ok(Item {
            id: ItemId::generate(),
            name: record.name.clone(),
            weight: record.weight,
            function_id: record.function_id.clone(),
            function,
        })
    }

    async fn simulate_network(&self) -> Result<(), StoreError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn resource(&self) -> &str {
        MEMORY_RESOURCE
    }

    async fn create(&self, record: &NewItem) -> Result<Item, StoreError> {
        self.simulate_network().await?;
        let item = self.insert(record.clone()).await?;
        trace!(id = %item.id, "memory store: item created");
        Ok(item)
    }

    async fn destroy(&self, id: &ItemId) -> Result<Item, StoreError> {
        self.simulate_network().await?;
        let item = self.remove(id).await?;
        trace!(id = %id, "memory store: item destroyed");
        Ok(item)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Item>, StoreError> {
        self.simulate_network().await?;
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(query.apply(self.items.read().await.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> MemoryBackend {
        MemoryBackend::with_functions(vec![Function::new("f1", "Fasteners")])
    }

    #[tokio::test]
    async fn test_create_resolves_function() {
        let store = backend();
        let item = Backend::create(&store, &NewItem::new("bolt", 1.0, "f1")).await.unwrap();
        assert_eq!(item.function.name, "Fasteners");
        assert_eq!(store.items().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_function() {
        let store = backend();
        let err = Backend::create(&store, &NewItem::new("bolt", 1.0, "nope")).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.items().await.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_missing_is_not_found() {
        let store = backend();
        let err = Backend::destroy(&store, &ItemId::from("missing")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_offline_fails_every_operation() {
        let store = backend();
        store.set_offline(true);

        assert!(matches!(
            Backend::query(&store, &Query::all()).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(Backend::create(&store, &NewItem::new("bolt", 1.0, "f1")).await.is_err());
        assert_eq!(store.query_count(), 0);

        store.set_offline(false);
        assert!(Backend::query(&store, &Query::all()).await.is_ok());
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn test_add_function_after_construction() {
        let store = MemoryBackend::new();
        store.add_function(Function::new("f9", "Late")).await;
        let item = store.insert(NewItem::new("x", 0.0, "f9")).await.unwrap();
        assert_eq!(item.function.name, "Late");
    }
}
