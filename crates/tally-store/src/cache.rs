//! Client-side item cache layered over a [`Backend`].
//!
//! Reproduces the read modes of a caching resource store:
//!
//! - `use_filter`: evaluate the query against every item seen so far, no I/O
//! - cached: return the response previously stored for the same query
//! - `bypass_cache` (or a cache miss): read from the backend, then optionally
//!   remember the response and inject the items into the local collection

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::{Backend, FindAllOptions, Item, ItemId, NewItem, Query, ResourceAdapter, StoreError};

/// An item in the local collection, tagged with its insertion position.
#[derive(Debug, Clone)]
struct Slot {
    position: u64,
    item: Item,
}

/// Every item seen, by id.
#[derive(Debug, Default)]
struct Collection {
    slots: HashMap<ItemId, Slot>,
    next_position: u64,
}

impl Collection {
    fn inject(&mut self, item: Item) {
        match self.slots.get_mut(&item.id) {
            // Keep the original position so filtered reads stay stable.
            Some(slot) => slot.item = item,
            None => {
                let position = self.next_position;
                self.next_position += 1;
                self.slots.insert(item.id.clone(), Slot { position, item });
            }
        }
    }
}

/// [`ResourceAdapter`] that caches responses and items client-side.
pub struct CachedResource<B> {
    backend: B,
    /// Replaced wholesale by full listings, so readers never see a partial one.
    collection: RwLock<Collection>,
    /// Cached responses by query key, as item ids.
    responses: DashMap<String, Vec<ItemId>>,
}

impl<B: Backend> CachedResource<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            collection: RwLock::new(Collection::default()),
            responses: DashMap::new(),
        }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of items in the local collection.
    pub async fn cached_len(&self) -> usize {
        self.collection.read().await.slots.len()
    }

    /// Drop all cached items and responses.
    pub async fn clear(&self) {
        self.collection.write().await.slots.clear();
        self.responses.clear();
    }

    async fn inject_all(&self, items: &[Item]) {
        let mut collection = self.collection.write().await;
        for item in items {
            collection.inject(item.clone());
        }
    }

    async fn eject(&self, id: &ItemId) {
        if self.collection.write().await.slots.remove(id).is_some() {
            trace!(id = %id, "cache: item ejected");
        }
    }

    /// Replace the collection with a full listing from the backend.
    async fn replace_all(&self, items: &[Item]) {
        let mut collection = self.collection.write().await;
        let mut fresh = Collection {
            slots: HashMap::with_capacity(items.len()),
            next_position: collection.next_position,
        };
        for item in items {
            fresh.inject(item.clone());
        }
        *collection = fresh;
    }

    /// The local collection in insertion order.
    async fn local_items(&self) -> Vec<Item> {
        let collection = self.collection.read().await;
        let mut slots: Vec<&Slot> = collection.slots.values().collect();
        slots.sort_by_key(|s| s.position);
        slots.into_iter().map(|s| s.item.clone()).collect()
    }

    async fn cached_response(&self, key: &str) -> Option<Vec<Item>> {
        let ids = self.responses.get(key)?.clone();
        let collection = self.collection.read().await;
        Some(
            ids.iter()
                .filter_map(|id| collection.slots.get(id).map(|s| s.item.clone()))
                .collect(),
        )
    }
}

#[async_trait]
impl<B: Backend> ResourceAdapter for CachedResource<B> {
    #[tracing::instrument(skip(self, record), fields(resource = %self.backend.resource(), name = %record.name))]
    async fn create(&self, record: NewItem) -> Result<Item, StoreError> {
        let item = self.backend.create(&record).await?;
        debug!(id = %item.id, "created item");
        self.inject_all(std::slice::from_ref(&item)).await;
        Ok(item)
    }

    #[tracing::instrument(skip(self, item), fields(resource = %self.backend.resource(), id = %item.id))]
    async fn destroy(&self, item: Item) -> Result<Item, StoreError> {
        let removed = self.backend.destroy(&item.id).await?;
        debug!("destroyed item");
        self.eject(&item.id).await;
        Ok(removed)
    }

    #[tracing::instrument(
        skip(self, query),
        fields(
            resource = %self.backend.resource(),
            bypass_cache = options.bypass_cache,
            use_filter = options.use_filter,
        )
    )]
    async fn find_all(
        &self,
        query: &Query,
        options: FindAllOptions,
    ) -> Result<Vec<Item>, StoreError> {
        if options.use_filter {
            let items = query.apply(&self.local_items().await);
            trace!(count = items.len(), "served find_all from local filter");
            return Ok(items);
        }

        let key = query.cache_key();
        if !options.bypass_cache
            && let Some(items) = self.cached_response(&key).await
        {
            trace!(count = items.len(), "served find_all from cached response");
            return Ok(items);
        }

        let items = self.backend.query(query).await?;
        debug!(count = items.len(), "fetched items from backend");

        if options.cache_response {
            if query.is_unbounded() {
                self.replace_all(&items).await;
            } else {
                self.inject_all(&items).await;
            }
            self.responses
                .insert(key, items.iter().map(|i| i.id.clone()).collect());
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Field, Function, MemoryBackend, Op};
    use pretty_assertions::assert_eq;

    fn backend() -> MemoryBackend {
        MemoryBackend::with_functions(vec![
            Function::new("f1", "Fasteners"),
            Function::new("f2", "Anchors"),
        ])
    }

    fn names(items: &[Item]) -> Vec<String> {
        items.iter().map(|i| i.name.clone()).collect()
    }

    #[tokio::test]
    async fn test_filtered_read_sees_only_fetched_items() {
        let resource = CachedResource::new(backend());
        resource.backend().insert(NewItem::new("bolt", 1.0, "f1")).await.unwrap();

        // Nothing fetched yet, so the local filter is empty.
        let items = resource.find_all(&Query::all(), FindAllOptions::filtered()).await.unwrap();
        assert!(items.is_empty());

        resource.find_all(&Query::all(), FindAllOptions::authoritative()).await.unwrap();
        let items = resource.find_all(&Query::all(), FindAllOptions::filtered()).await.unwrap();
        assert_eq!(names(&items), vec!["bolt"]);
    }

    #[tokio::test]
    async fn test_cached_response_is_stale_until_bypassed() {
        let resource = CachedResource::new(backend());
        let query = Query::all().where_eq(Field::FunctionId, "f1");

        resource.find_all(&query, FindAllOptions::default()).await.unwrap();
        resource.backend().insert(NewItem::new("bolt", 1.0, "f1")).await.unwrap();

        let cached = resource.find_all(&query, FindAllOptions::default()).await.unwrap();
        assert!(cached.is_empty());

        let fresh = resource.find_all(&query, FindAllOptions::authoritative()).await.unwrap();
        assert_eq!(names(&fresh), vec!["bolt"]);
    }

    #[tokio::test]
    async fn test_create_and_destroy_maintain_local_collection() {
        let resource = CachedResource::new(backend());

        let bolt = resource.create(NewItem::new("bolt", 1.0, "f1")).await.unwrap();
        resource.create(NewItem::new("anchor", 3.0, "f2")).await.unwrap();
        assert_eq!(resource.cached_len().await, 2);

        resource.destroy(bolt).await.unwrap();
        let items = resource
            .find_all(&Query::all().filter(Field::Weight, Op::Gt, 0), FindAllOptions::filtered())
            .await
            .unwrap();
        assert_eq!(names(&items), vec!["anchor"]);
    }

    #[tokio::test]
    async fn test_full_fetch_replaces_collection() {
        let resource = CachedResource::new(backend());
        let bolt = resource.create(NewItem::new("bolt", 1.0, "f1")).await.unwrap();

        // Removed behind the cache's back.
        resource.backend().remove(&bolt.id).await.unwrap();
        resource.find_all(&Query::all(), FindAllOptions::authoritative()).await.unwrap();

        assert_eq!(resource.cached_len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_filtered_reads_never_see_a_partial_listing() {
        let resource = std::sync::Arc::new(CachedResource::new(backend()));
        for i in 0..50 {
            resource
                .backend()
                .insert(NewItem::new(format!("item {i}"), 1.0, "f1"))
                .await
                .unwrap();
        }
        resource.find_all(&Query::all(), FindAllOptions::authoritative()).await.unwrap();

        let writer = {
            let resource = std::sync::Arc::clone(&resource);
            tokio::spawn(async move {
                for _ in 0..200 {
                    resource
                        .find_all(&Query::all(), FindAllOptions::authoritative())
                        .await
                        .unwrap();
                }
            })
        };

        while !writer.is_finished() {
            let items = resource
                .find_all(&Query::all(), FindAllOptions::filtered())
                .await
                .unwrap();
            assert_eq!(items.len(), 50);
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_cache_response_leaves_cache_untouched() {
        let resource = CachedResource::new(backend());
        resource.backend().insert(NewItem::new("bolt", 1.0, "f1")).await.unwrap();

        let options = FindAllOptions {
            cache_response: false,
            ..FindAllOptions::authoritative()
        };
        let items = resource.find_all(&Query::all(), options).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(resource.cached_len().await, 0);
    }
}
