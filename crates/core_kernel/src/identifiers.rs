//! Identifiers for units of work and transactions
//!
//! Entities carry their own application-defined keys; these identifiers only
//! name the moving parts of the data-access layer so that log lines from one
//! unit of work can be correlated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! lifecycle_id {
    ($(#[$meta:meta])* $name:ident => $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Time-ordered identifier, sortable by creation
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Prefix used by `Display` and accepted by `FromStr`
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            /// Parses `PREFIX-<uuid>` or a bare UUID
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Uuid::parse_str(raw).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

lifecycle_id! {
    /// Names one unit of work in log spans
    UnitOfWorkId => "UOW"
}

lifecycle_id! {
    /// Names one store transaction opened by a unit of work
    TransactionId => "TXN"
}
