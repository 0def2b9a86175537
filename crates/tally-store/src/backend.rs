//! Raw access to a backing item store, without client-side caching.

use async_trait::async_trait;

use crate::{Item, ItemId, NewItem, Query, StoreError};

/// A backing store that [`CachedResource`](crate::CachedResource) reads through.
///
/// Implementations always talk to the store itself; response caching and
/// client-side filtering are layered on top.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name of the resource, used in errors and logs.
    fn resource(&self) -> &str;

    async fn create(&self, record: &NewItem) -> Result<Item, StoreError>;

    async fn destroy(&self, id: &ItemId) -> Result<Item, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Item>, StoreError>;
}
