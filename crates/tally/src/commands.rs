//! Store-backed subcommands.

use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use tally_core::{FilterResult, ItemService, Mutation, ReadPath, ServiceEvent, Snapshot};
use tally_store::{
    CachedResource, FindAllOptions, Field, HttpBackend, HttpBackendConfig, Item, NewItem, Op,
    OrderBy, Query, ResourceAdapter,
};

use crate::StoreArgs;

/// How long a filtered read may take before the command gives up.
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

fn connect(store: &StoreArgs) -> Result<Arc<CachedResource<HttpBackend>>> {
    let config = HttpBackendConfig::new(&store.store_url).with_resource(&store.resource);
    let backend = HttpBackend::new(config)
        .map_err(|e| miette::miette!("failed to create store client: {}", e))?;
    Ok(Arc::new(CachedResource::new(backend)))
}

/// Print items as a table, or as JSON.
pub fn print_items(items: &[Item], json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(items).map_err(|e| miette::miette!("{}", e))?;
        println!("{}", out);
        return Ok(());
    }

    if items.is_empty() {
        println!("  (no items)");
    }
    for item in items {
        println!(
            "  {:<16} {:<24} {:>8.2}  {}",
            item.function.name, item.name, item.weight, item.id
        );
    }
    Ok(())
}

pub fn print_snapshot(label: &str, snapshot: &Snapshot, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(snapshot).map_err(|e| miette::miette!("{}", e))?;
        println!("{}", out);
        return Ok(());
    }

    println!(
        "{} #{} at {} ({} items)",
        label,
        snapshot.sequence,
        snapshot.fetched_at.format("%H:%M:%S"),
        snapshot.len()
    );
    print_items(&snapshot.items, false)
}

pub fn print_result(result: &FilterResult, json: bool) -> Result<()> {
    if !json {
        println!("{} answer ({} items)", result.path, result.items.len());
    }
    print_items(&result.items, json)
}

pub async fn watch(
    store: &StoreArgs,
    function: Option<String>,
    interval: u64,
    json: bool,
) -> Result<()> {
    let mut builder = ItemService::builder(connect(store)?);
    if let Some(function) = function {
        builder = builder.view_query(Query::all().where_eq(Field::FunctionId, function));
    }
    let service = builder.start();

    let mut events = service.events();
    let mut items = service.items();

    let period = Duration::from_secs(interval.max(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(store_url = %store.store_url, resource = %store.resource, "watching items, ctrl-c to stop");

    loop {
        tokio::select! {
            snapshot = items.next() => match snapshot {
                Some(snapshot) => print_snapshot("snapshot", &snapshot, json)?,
                None => break,
            },
            event = events.recv() => match event {
                Ok(ServiceEvent::FetchFailed { seq, error }) => {
                    warn!(seq, %error, "refresh failed, keeping last snapshot");
                }
                Ok(event) => debug!(?event, "service event"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "event receiver lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => service.refresh(),
            _ = tokio::signal::ctrl_c() => {
                info!("stopping");
                break;
            }
        }
    }

    service.shutdown().await;
    Ok(())
}

pub async fn add(
    store: &StoreArgs,
    name: String,
    weight: f64,
    function: String,
    json: bool,
) -> Result<()> {
    let record = NewItem::new(name, weight, function);
    record
        .validate()
        .map_err(|e| miette::miette!("invalid item: {}", e))?;

    let service = ItemService::builder(connect(store)?)
        .refresh_on_items(false)
        .start();
    let snapshot = service
        .apply(Mutation::Create(record))
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    info!(items = snapshot.len(), "item created");
    print_snapshot("snapshot", &snapshot, json)?;
    service.shutdown().await;
    Ok(())
}

pub async fn remove(store: &StoreArgs, id: &str) -> Result<()> {
    let adapter = connect(store)?;

    let found = adapter
        .find_all(
            &Query::all().where_eq(Field::Id, id),
            FindAllOptions::authoritative(),
        )
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    let item = found
        .into_iter()
        .next()
        .ok_or_else(|| miette::miette!("no item with id {}", id))?;

    let service = ItemService::builder(adapter).refresh_on_items(false).start();
    let snapshot = service
        .apply(Mutation::Destroy(item))
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    info!(id, items = snapshot.len(), "item destroyed");
    service.shutdown().await;
    Ok(())
}

/// Assemble a query from command-line filters.
pub fn build_query(
    function: Option<String>,
    name_contains: Option<String>,
    order_by: Vec<OrderBy>,
    offset: Option<usize>,
    limit: Option<usize>,
) -> Query {
    let mut query = Query::all();
    if let Some(function) = function {
        query = query.where_eq(Field::FunctionId, function);
    }
    if let Some(needle) = name_contains {
        query = query.filter(Field::Name, Op::Contains, needle);
    }
    query.order_by = order_by;
    query.offset = offset;
    query.limit = limit;
    query
}

pub async fn query(store: &StoreArgs, query: Query, compare: bool, json: bool) -> Result<()> {
    let service = ItemService::builder(connect(store)?)
        .refresh_on_items(false)
        .start();

    if compare {
        // Load the collection so the fast path has something to filter.
        let mut items = service.items();
        let snapshot = tokio::time::timeout(QUERY_TIMEOUT, items.next())
            .await
            .map_err(|_| miette::miette!("timed out loading the collection"))?
            .ok_or_else(|| miette::miette!("item view closed"))?;
        debug!(items = snapshot.len(), "collection loaded");
    }

    let view = service.filtered();
    let mut results = view.results();
    let request = view.submit(query);

    let mut fast: Option<Arc<FilterResult>> = None;
    loop {
        let result = tokio::time::timeout(QUERY_TIMEOUT, results.next())
            .await
            .map_err(|_| miette::miette!("query timed out"))?
            .ok_or_else(|| miette::miette!("filtered view closed"))?;
        if result.request != request {
            continue;
        }

        match result.path {
            ReadPath::Fast => {
                if compare {
                    print_result(&result, json)?;
                }
                fast = Some(result);
            }
            ReadPath::Authoritative => {
                print_result(&result, json)?;
                if compare && let Some(fast) = &fast {
                    if fast.items == result.items {
                        info!("fast and authoritative answers agree");
                    } else {
                        warn!("fast answer was stale");
                    }
                }
                break;
            }
        }
    }

    service.shutdown().await;
    Ok(())
}
