//! Reactive item view for Tally.
//!
//! [`ItemService`] keeps a continuously fresh, deterministically ordered
//! snapshot of the item collection and routes create/destroy requests
//! through the store, re-synchronizing after each one.
//!
//! ## Components
//!
//! - **Intake**: fire-and-forget create/destroy commands, failures isolated
//! - **Pipeline**: one authoritative fetch per trigger, apply-if-newer
//! - **Sort**: function name, then item name, ties in fetch order
//! - **Replay cache**: latest snapshot, replayed to late subscribers
//! - **Filter**: per-query fast and authoritative reads

mod config;
mod error;
mod events;
pub mod filter;
mod intake;
pub mod pipeline;
pub mod replay;
mod service;
mod snapshot;
pub mod sort;

pub use config::ServiceConfig;
pub use error::CoreError;
pub use events::{MutationId, MutationKind, PipelineStats, ServiceEvent, TriggerSource};
pub use filter::{FilterResult, FilteredView, QuerySink, ReadPath};
pub use intake::{Mutation, MutationIntake};
pub use pipeline::{FetchOutcome, PipelineHandle, SnapshotCache};
pub use replay::{Publish, ReplayCache, Subscription};
pub use service::{ItemService, ItemServiceBuilder};
pub use snapshot::Snapshot;
pub use sort::sort_items;
