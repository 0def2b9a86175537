//! Remote resource adapter for Tally's item collection.
//!
//! This crate owns the item records and everything needed to read and write
//! them against a backing store.
//!
//! ## Features
//!
//! - **Adapter**: the [`ResourceAdapter`] seam the reactive core depends on
//! - **Cache**: client-side response cache and filtered reads ([`CachedResource`])
//! - **HTTP**: JSON REST backend with retry on transient failures
//! - **Memory**: in-process backend for tests and offline use

mod adapter;
mod backend;
pub mod cache;
mod client;
mod error;
pub mod memory;
pub mod query;
mod types;

pub use adapter::{FindAllOptions, ResourceAdapter};
pub use backend::Backend;
pub use cache::CachedResource;
pub use client::{HttpBackend, HttpBackendConfig};
pub use error::StoreError;
pub use memory::MemoryBackend;
pub use query::{Condition, Direction, Field, Op, OrderBy, Query};
pub use types::{Function, FunctionId, Item, ItemId, NewItem};
