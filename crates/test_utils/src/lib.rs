//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! data-access test suite.
//!
//! # Modules
//!
//! - `fixtures`: Sample entity types, their model, and pre-built rows
//! - `builders`: Builder patterns for test data construction
//! - `database`: Store and unit-of-work helpers for integration tests
//! - `assertions`: Assertion helpers for errors and tracking states
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
