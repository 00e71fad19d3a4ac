//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating fixture entities and key
//! values.

use core_kernel::KeyValue;
use proptest::collection::btree_set;
use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::fixtures::{Note, Product};

/// Strategy for generating prices with two decimal places
pub fn price_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for generating product names
pub fn product_name_strategy() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,12}"
}

/// Strategy for generating a product with the given id
pub fn product_with_id(id: i64) -> impl Strategy<Value = Product> {
    (product_name_strategy(), price_strategy(), 0i32..10_000i32).prop_map(
        move |(name, price, stock)| Product {
            id,
            name,
            price,
            stock,
        },
    )
}

/// Strategy for generating up to `max` products with distinct ids
pub fn products_strategy(max: usize) -> impl Strategy<Value = Vec<Product>> {
    btree_set(1i64..1_000_000i64, 0..=max).prop_flat_map(|ids| {
        ids.into_iter()
            .map(product_with_id)
            .collect::<Vec<_>>()
    })
}

/// Strategy for generating keyless notes
pub fn note_strategy() -> impl Strategy<Value = Note> {
    ("[a-z]{3,8}", "[a-z ]{1,40}").prop_map(|(author, text)| Note { author, text })
}

/// Strategy for generating scalar key values of mixed types
pub fn key_value_strategy() -> impl Strategy<Value = KeyValue> {
    prop_oneof![
        any::<i64>().prop_map(KeyValue::from),
        any::<bool>().prop_map(KeyValue::from),
        "[a-zA-Z0-9]{0,16}".prop_map(KeyValue::from),
    ]
}
