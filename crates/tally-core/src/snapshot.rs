//! The sorted collection published to observers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_store::Item;

/// The full, sorted collection as of one applied authoritative fetch.
///
/// A snapshot replaces its predecessor wholesale; it is never patched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Sequence number of the trigger whose fetch produced this snapshot.
    pub sequence: u64,
    pub fetched_at: DateTime<Utc>,
    pub items: Vec<Item>,
}

impl Snapshot {
    /// Wrap items that are already in snapshot order.
    pub fn new(sequence: u64, items: Vec<Item>) -> Self {
        Self {
            sequence,
            fetched_at: Utc::now(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }

    /// Item names in order.
    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.name.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
