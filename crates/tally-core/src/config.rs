//! Service configuration.

use tally_store::Query;

/// Default capacity of the service event channel.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Settings for an [`ItemService`](crate::ItemService).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Whether [`ItemService::items`](crate::ItemService::items) issues a
    /// refresh every time it is called.
    pub refresh_on_items: bool,
    /// Events a slow event subscriber may fall behind by before it lags.
    pub event_capacity: usize,
    /// The collection the shared snapshot tracks.
    pub view_query: Query,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            refresh_on_items: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            view_query: Query::all(),
        }
    }
}
