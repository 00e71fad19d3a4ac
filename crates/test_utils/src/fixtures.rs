//! Pre-built Test Fixtures
//!
//! Provides a small order-management schema used across the test suite:
//! products, customers, orders with their lines, and keyless notes. The
//! fixtures are consistent and predictable so tests can assert on exact
//! values.

use chrono::{DateTime, TimeZone, Utc};
use core_kernel::{Entity, Model};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Catalog item keyed by `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

impl Entity for Product {
    const COLLECTION: &'static str = "products";
}

/// Customer keyed by `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl Entity for Customer {
    const COLLECTION: &'static str = "customers";
}

/// Order with a reference to its customer and a collection of lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub placed_at: DateTime<Utc>,
    pub total: Decimal,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
}

impl Entity for Order {
    const COLLECTION: &'static str = "orders";
}

/// Order line keyed by `(order_id, line_no)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: i64,
    pub line_no: i32,
    pub product_id: i64,
    pub quantity: i32,
    #[serde(default)]
    pub product: Option<Product>,
}

impl Entity for OrderLine {
    const COLLECTION: &'static str = "order_lines";
}

/// Registered without a primary key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub author: String,
    pub text: String,
}

impl Entity for Note {
    const COLLECTION: &'static str = "notes";
}

/// Never registered in [`sample_model`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unmapped {
    pub id: i64,
}

impl Entity for Unmapped {
    const COLLECTION: &'static str = "unmapped";
}

/// Store metadata for the fixture schema
pub fn sample_model() -> Model {
    Model::builder()
        .entity::<Product>(|e| e.key(["id"]))
        .entity::<Customer>(|e| e.key(["id"]))
        .entity::<Order>(|e| {
            e.key(["id"])
                .has_one("customer", Customer::COLLECTION, ["customer_id"])
                .has_many("lines", OrderLine::COLLECTION, ["order_id"])
        })
        .entity::<OrderLine>(|e| {
            e.key(["order_id", "line_no"])
                .has_one("product", Product::COLLECTION, ["product_id"])
        })
        .entity::<Note>(|e| e)
        .build()
}

/// Fixture for catalog data
pub struct CatalogFixtures;

impl CatalogFixtures {
    pub fn widget() -> Product {
        Product {
            id: 1,
            name: "Widget".to_string(),
            price: dec!(9.99),
            stock: 100,
        }
    }

    pub fn gadget() -> Product {
        Product {
            id: 2,
            name: "Gadget".to_string(),
            price: dec!(24.50),
            stock: 10,
        }
    }

    pub fn gizmo() -> Product {
        Product {
            id: 3,
            name: "Gizmo".to_string(),
            price: dec!(4.25),
            stock: 0,
        }
    }

    /// Widget, gadget and gizmo, in id order
    pub fn products() -> Vec<Product> {
        vec![Self::widget(), Self::gadget(), Self::gizmo()]
    }
}

/// Fixture for customers and their orders
pub struct OrderFixtures;

impl OrderFixtures {
    pub fn alice() -> Customer {
        Customer {
            id: 10,
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    pub fn bob() -> Customer {
        Customer {
            id: 11,
            name: "Bob".to_string(),
            email: "bob@example.com".to_string(),
        }
    }

    /// Fixed timestamp for orders (Mar 1, 2024, 09:30 UTC)
    pub fn placed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    /// Alice's order: two widgets and one gadget
    pub fn alice_order() -> Order {
        Order {
            id: 100,
            customer_id: Self::alice().id,
            placed_at: Self::placed_at(),
            total: dec!(44.48),
            customer: None,
            lines: Vec::new(),
        }
    }

    /// Bob's order with no lines
    pub fn bob_order() -> Order {
        Order {
            id: 101,
            customer_id: Self::bob().id,
            placed_at: Self::placed_at(),
            total: dec!(0),
            customer: None,
            lines: Vec::new(),
        }
    }

    pub fn alice_lines() -> Vec<OrderLine> {
        vec![
            OrderLine {
                order_id: 100,
                line_no: 1,
                product_id: CatalogFixtures::widget().id,
                quantity: 2,
                product: None,
            },
            OrderLine {
                order_id: 100,
                line_no: 2,
                product_id: CatalogFixtures::gadget().id,
                quantity: 1,
                product: None,
            },
        ]
    }
}

/// Fixture for keyless notes
pub struct NoteFixtures;

impl NoteFixtures {
    pub fn reminder() -> Note {
        Note {
            author: "ops".to_string(),
            text: "restock gizmos".to_string(),
        }
    }
}
