//! Core Kernel - Contracts for the data-access layer
//!
//! This crate holds everything the repository and unit-of-work layer agrees on
//! with its callers and with the collaborator store, and performs no I/O:
//! - The `Entity` trait and change-tracking states
//! - Primary key values and their canonical encoding
//! - Store metadata (`Model`): key fields and navigations per entity type
//! - Include paths, filters and orderings for composed queries
//! - Store ports (`DataStore`, `StoreSession`) and raw SQL statements
//! - Lifecycle identifiers, the type-keyed registry and the error taxonomy

pub mod criteria;
pub mod entity;
pub mod error;
pub mod identifiers;
pub mod include;
pub mod key;
pub mod model;
pub mod ports;
pub mod registry;
pub mod sql;

pub use criteria::{Filter, OrderBy};
pub use entity::{Entity, EntityState};
pub use error::{CoreError, CoreResult};
pub use identifiers::{TransactionId, UnitOfWorkId};
pub use include::{IncludePath, IncludePaths};
pub use key::{KeyValue, KeyValues, RowKey};
pub use model::{EntityModel, Model, Navigation, NavigationKind};
pub use ports::{DataStore, QuerySource, Row, RowChange, StoreError, StoreResult, StoreSession};
pub use registry::TypeRegistry;
pub use sql::{InterpolatedSql, SqlStatement, SqlValue};
