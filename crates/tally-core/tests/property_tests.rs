//! Property-based tests for snapshot ordering and filtering.

use proptest::prelude::*;
use tally_core::sort::{sort_items, sort_key};
use tally_store::{Direction, Field, Function, Item, ItemId, Query};

// Small alphabets with mixed case so ties and case folding come up often.
fn label() -> impl Strategy<Value = String> {
    "[aAbBcC]{1,3}".prop_map(|s| s.to_string())
}

fn items() -> impl Strategy<Value = Vec<Item>> {
    prop::collection::vec((label(), label(), 0.0..100.0f64), 0..40).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (name, function, weight))| Item {
                id: ItemId(format!("i{i}")),
                name,
                weight,
                function_id: function.as_str().into(),
                function: Function::new(function.clone(), function),
            })
            .collect()
    })
}

fn ids(items: &[Item]) -> Vec<String> {
    items.iter().map(|i| i.id.to_string()).collect()
}

proptest! {
    #[test]
    fn sorted_output_is_a_permutation(input in items()) {
        let sorted = sort_items(input.clone());

        let mut expected = ids(&input);
        let mut actual = ids(&sorted);
        expected.sort();
        actual.sort();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn sorted_output_is_ordered_by_key(input in items()) {
        let sorted = sort_items(input);
        for pair in sorted.windows(2) {
            prop_assert!(sort_key(&pair[0]) <= sort_key(&pair[1]));
        }
    }

    #[test]
    fn equal_keys_keep_input_order(input in items()) {
        let position = |item: &Item| {
            item.id.as_str()[1..].parse::<usize>().unwrap()
        };

        let sorted = sort_items(input);
        for pair in sorted.windows(2) {
            if sort_key(&pair[0]) == sort_key(&pair[1]) {
                prop_assert!(position(&pair[0]) < position(&pair[1]));
            }
        }
    }

    #[test]
    fn sorting_is_idempotent(input in items()) {
        let once = sort_items(input);
        let twice = sort_items(once.clone());
        prop_assert_eq!(ids(&once), ids(&twice));
    }

    #[test]
    fn limit_and_offset_slice_the_full_result(
        input in items(),
        offset in 0usize..50,
        limit in 0usize..50,
    ) {
        let full = Query::all().order_by(Field::Weight, Direction::Desc);
        let page = full.clone().offset(offset).limit(limit);

        let expected: Vec<String> = ids(&full.apply(&input))
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect();
        prop_assert_eq!(ids(&page.apply(&input)), expected);
    }
}
