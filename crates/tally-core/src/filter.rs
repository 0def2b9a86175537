//! Filtered reads with stale-while-revalidate semantics.
//!
//! Every submitted query is answered twice, concurrently: once from the
//! adapter's client-side data (fast, possibly stale) and once from the store
//! itself (authoritative). Both answers are emitted in the order they
//! resolve. A path that fails emits nothing. This sub-pipeline never touches
//! the shared snapshot cache.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tally_store::{FindAllOptions, Item, Query, ResourceAdapter};
use tracing::{debug, warn};

use crate::replay::{ReplayCache, Subscription};

/// Which read answered a filter request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadPath {
    /// Client-side filter over previously fetched items.
    Fast,
    /// Read straight from the store.
    Authoritative,
}

impl ReadPath {
    fn options(self) -> FindAllOptions {
        match self {
            ReadPath::Fast => FindAllOptions::filtered(),
            ReadPath::Authoritative => FindAllOptions::authoritative(),
        }
    }
}

impl fmt::Display for ReadPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadPath::Fast => f.write_str("fast"),
            ReadPath::Authoritative => f.write_str("authoritative"),
        }
    }
}

/// One answer to a filter request.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    /// Request number returned by [`QuerySink::submit`].
    pub request: u64,
    pub path: ReadPath,
    pub query: Arc<Query>,
    pub items: Vec<Item>,
}

/// Input side of a filtered view.
#[derive(Clone)]
pub struct QuerySink {
    adapter: Arc<dyn ResourceAdapter>,
    results: Arc<ReplayCache<Arc<FilterResult>>>,
    next_request: Arc<AtomicU64>,
}

impl QuerySink {
    /// Submit a query; both of its answers land on the view's result stream.
    pub fn submit(&self, query: Query) -> u64 {
        let request = self.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        let query = Arc::new(query);
        debug!(request, "filter request submitted");

        for path in [ReadPath::Fast, ReadPath::Authoritative] {
            let adapter = Arc::clone(&self.adapter);
            let results = Arc::clone(&self.results);
            let query = Arc::clone(&query);
            tokio::spawn(async move {
                match adapter.find_all(&query, path.options()).await {
                    Ok(items) => {
                        debug!(request, %path, items = items.len(), "filter result");
                        results.publish(Arc::new(FilterResult {
                            request,
                            path,
                            query,
                            items,
                        }));
                    }
                    Err(e) => {
                        warn!(request, %path, error = %e, "filter read failed");
                    }
                }
            });
        }

        request
    }
}

/// An independent filtered view: a query sink plus its result stream.
///
/// The result stream ends once the view, every sink cloned from it, and all
/// in-flight reads are gone.
pub struct FilteredView {
    sink: QuerySink,
    results: Arc<ReplayCache<Arc<FilterResult>>>,
}

impl FilteredView {
    pub(crate) fn new(adapter: Arc<dyn ResourceAdapter>) -> Self {
        let results = Arc::new(ReplayCache::new());
        let sink = QuerySink {
            adapter,
            results: Arc::clone(&results),
            next_request: Arc::new(AtomicU64::new(0)),
        };
        Self { sink, results }
    }

    /// A sink for submitting queries to this view.
    pub fn sink(&self) -> QuerySink {
        self.sink.clone()
    }

    /// Shorthand for `self.sink().submit(query)`.
    pub fn submit(&self, query: Query) -> u64 {
        self.sink.submit(query)
    }

    /// Subscribe to results, starting with the most recent one.
    pub fn results(&self) -> Subscription<Arc<FilterResult>> {
        self.results.subscribe()
    }

    /// The most recent result, if any.
    pub fn latest(&self) -> Option<Arc<FilterResult>> {
        self.results.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_store::{CachedResource, Function, MemoryBackend, NewItem};

    #[test]
    fn test_read_path_options() {
        assert!(ReadPath::Fast.options().use_filter);
        assert!(ReadPath::Authoritative.options().bypass_cache);
        assert_eq!(ReadPath::Fast.to_string(), "fast");
    }

    #[tokio::test]
    async fn test_request_numbers_are_shared_by_sinks() {
        let backend = MemoryBackend::with_functions(vec![Function::new("f", "F")]);
        backend.insert(NewItem::new("bolt", 1.0, "f")).await.unwrap();
        let view = FilteredView::new(Arc::new(CachedResource::new(backend)));

        let mut results = view.results();
        let sink = view.sink();
        assert_eq!(view.submit(Query::all()), 1);
        assert_eq!(sink.submit(Query::all()), 2);

        let mut seen = Vec::new();
        for _ in 0..4 {
            let result = results.next().await.unwrap();
            seen.push((result.request, result.path));
        }
        seen.sort_by_key(|(request, path)| (*request, *path == ReadPath::Authoritative));
        assert_eq!(
            seen,
            vec![
                (1, ReadPath::Fast),
                (1, ReadPath::Authoritative),
                (2, ReadPath::Fast),
                (2, ReadPath::Authoritative),
            ]
        );
    }
}
