//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::fixtures::{CatalogFixtures, Customer, Order, OrderFixtures, OrderLine, Product};

/// Builder for constructing test products
pub struct ProductBuilder {
    product: Product,
}

impl Default for ProductBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductBuilder {
    /// Creates a new builder starting from the widget fixture
    pub fn new() -> Self {
        Self {
            product: CatalogFixtures::widget(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.product.id = id;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.product.name = name.into();
        self
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.product.price = price;
        self
    }

    pub fn with_stock(mut self, stock: i32) -> Self {
        self.product.stock = stock;
        self
    }

    pub fn build(self) -> Product {
        self.product
    }
}

/// Builder for constructing test orders
pub struct OrderBuilder {
    order: Order,
}

impl Default for OrderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBuilder {
    /// Creates a new builder starting from Alice's order without lines
    pub fn new() -> Self {
        Self {
            order: OrderFixtures::alice_order(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.order.id = id;
        self.order.lines.iter_mut().for_each(|line| line.order_id = id);
        self
    }

    /// Sets the customer id and clears any loaded customer
    pub fn for_customer(mut self, customer: &Customer) -> Self {
        self.order.customer_id = customer.id;
        self.order.customer = None;
        self
    }

    pub fn with_total(mut self, total: Decimal) -> Self {
        self.order.total = total;
        self
    }

    pub fn placed_at(mut self, placed_at: DateTime<Utc>) -> Self {
        self.order.placed_at = placed_at;
        self
    }

    /// Adds a line for `product`, numbered after the existing lines
    pub fn with_line(mut self, product: &Product, quantity: i32) -> Self {
        let line_no = self.order.lines.len() as i32 + 1;
        self.order.lines.push(OrderLine {
            order_id: self.order.id,
            line_no,
            product_id: product.id,
            quantity,
            product: None,
        });
        self
    }

    pub fn build(self) -> Order {
        self.order
    }

    /// The order without its lines, plus the lines to add separately
    pub fn build_with_lines(self) -> (Order, Vec<OrderLine>) {
        let mut order = self.order;
        let lines = std::mem::take(&mut order.lines);
        (order, lines)
    }
}
