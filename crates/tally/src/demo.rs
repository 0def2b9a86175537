//! Offline demo against an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use tally_core::{ItemService, Mutation, ServiceConfig, ServiceEvent};
use tally_store::{CachedResource, Field, Function, MemoryBackend, NewItem, Query};

use crate::commands::{print_result, print_snapshot};

const FUNCTIONS: &[(&str, &str)] = &[
    ("fasteners", "Fasteners"),
    ("anchors", "Anchors"),
    ("adhesives", "adhesives"),
];

const SEED: &[(&str, f64, &str)] = &[
    ("hex bolt", 12.5, "fasteners"),
    ("Wing nut", 3.0, "fasteners"),
    ("drop-in anchor", 40.0, "anchors"),
    ("epoxy", 250.0, "adhesives"),
];

/// Run the demo.
pub async fn run(latency_ms: u64) -> Result<()> {
    let functions = FUNCTIONS.iter().map(|(id, name)| Function::new(*id, *name));
    let backend =
        MemoryBackend::with_functions(functions).with_latency(Duration::from_millis(latency_ms));
    for (name, weight, function) in SEED {
        backend
            .insert(NewItem::new(*name, *weight, *function))
            .await
            .map_err(|e| miette::miette!("failed to seed store: {}", e))?;
    }

    let service = ItemService::start(
        Arc::new(CachedResource::new(backend)),
        ServiceConfig::default(),
    );

    let mut events = service.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(?event, "service event"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "event receiver lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!(latency_ms, "loading collection");
    let mut items = service.items();
    let initial = items
        .next()
        .await
        .ok_or_else(|| miette::miette!("item view closed"))?;
    print_snapshot("initial", &initial, false)?;

    info!("creating three items concurrently");
    let (a, b, c) = tokio::join!(
        service.apply(Mutation::Create(NewItem::new("toggle bolt", 18.0, "anchors"))),
        service.apply(Mutation::Create(NewItem::new("cyanoacrylate", 20.0, "adhesives"))),
        service.apply(Mutation::Create(NewItem::new("carriage bolt", 30.0, "fasteners"))),
    );
    for outcome in [a, b, c] {
        outcome.map_err(|e| miette::miette!("{}", e))?;
    }
    let current = service
        .current()
        .ok_or_else(|| miette::miette!("no snapshot applied"))?;
    print_snapshot("after creates", &current, false)?;

    info!("creating an item with an unknown function");
    match service
        .apply(Mutation::Create(NewItem::new("mystery", 1.0, "unknown")))
        .await
    {
        Err(e) => info!(error = %e, "rejected; the view is unchanged"),
        Ok(_) => warn!("store accepted an item with an unknown function"),
    }

    if let Some(victim) = current.items.first().cloned() {
        info!(id = %victim.id, name = %victim.name, "destroying the first item");
        let snapshot = service
            .apply(Mutation::Destroy(victim))
            .await
            .map_err(|e| miette::miette!("{}", e))?;
        print_snapshot("after destroy", &snapshot, false)?;
    }

    info!("filtering for fasteners");
    let view = service.filtered();
    let mut results = view.results();
    view.submit(Query::all().where_eq(Field::FunctionId, "fasteners"));
    for _ in 0..2 {
        let result = results
            .next()
            .await
            .ok_or_else(|| miette::miette!("filtered view closed"))?;
        print_result(&result, false)?;
    }

    service.shutdown().await;
    info!(stats = ?service.stats(), "demo complete");
    Ok(())
}
