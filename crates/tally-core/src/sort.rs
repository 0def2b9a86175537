//! Deterministic ordering of fetched collections.
//!
//! Items are ordered by uppercased function name, then uppercased item name.
//! Items that compare equal on both keys keep their position from the fetch
//! result: the original index is the last sort key, so the outcome does not
//! depend on the stability of the sort algorithm.

use tally_store::Item;

/// The `(function, name)` key an item is ordered by.
pub fn sort_key(item: &Item) -> (String, String) {
    (item.function.name.to_uppercase(), item.name.to_uppercase())
}

/// Sort a fetched collection into snapshot order.
pub fn sort_items(items: Vec<Item>) -> Vec<Item> {
    let mut keyed: Vec<((String, String), usize, Item)> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| (sort_key(&item), index, item))
        .collect();

    keyed.sort_unstable_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
    keyed.into_iter().map(|(_, _, item)| item).collect()
}
