//! The resource adapter seam consumed by the reactive core.

use async_trait::async_trait;

use crate::{Item, NewItem, Query, StoreError};

/// Read options for [`ResourceAdapter::find_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindAllOptions {
    /// Skip any cached response and read from the backing store.
    pub bypass_cache: bool,
    /// Answer by filtering previously fetched items client-side.
    pub use_filter: bool,
    /// Remember the response for later non-bypassing reads.
    pub cache_response: bool,
}

impl Default for FindAllOptions {
    fn default() -> Self {
        Self {
            bypass_cache: false,
            use_filter: false,
            cache_response: true,
        }
    }
}

impl FindAllOptions {
    /// Read that reflects the backing store's current state.
    pub fn authoritative() -> Self {
        Self {
            bypass_cache: true,
            ..Self::default()
        }
    }

    /// Fast, possibly stale read served from client-side data.
    pub fn filtered() -> Self {
        Self {
            use_filter: true,
            ..Self::default()
        }
    }
}

/// Create, destroy and query operations against a remote item store.
#[async_trait]
pub trait ResourceAdapter: Send + Sync {
    /// Create an item, returning it as stored.
    async fn create(&self, record: NewItem) -> Result<Item, StoreError>;

    /// Destroy an item, returning the removed record.
    async fn destroy(&self, item: Item) -> Result<Item, StoreError>;

    /// Read the items selected by `query`.
    async fn find_all(&self, query: &Query, options: FindAllOptions)
    -> Result<Vec<Item>, StoreError>;
}
