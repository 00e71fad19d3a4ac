//! Primary key values
//!
//! A key is an ordered list of one or more values in the entity's declared key
//! order. Keys compare by their canonical JSON encoding ([`RowKey`]), which is
//! type-sensitive: `1` and `"1"` are different keys, so a composite key given
//! in the wrong order never resolves to another entity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// A single key component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyValue(Value);

impl KeyValue {
    /// Wraps a JSON value taken from an entity's field
    pub fn from_json(value: Value) -> Self {
        Self(value)
    }

    /// Returns the underlying JSON value
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// Returns true if the component is null (an unassigned key field)
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

macro_rules! key_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for KeyValue {
                fn from(value: $ty) -> Self {
                    Self(Value::from(value))
                }
            }

            impl From<$ty> for KeyValues {
                fn from(value: $ty) -> Self {
                    Self(vec![KeyValue::from(value)])
                }
            }
        )*
    };
}

key_value_from!(i8, i16, i32, i64, u8, u16, u32, u64, bool, String, &str);

impl From<Uuid> for KeyValue {
    fn from(value: Uuid) -> Self {
        // Same form serde produces for a Uuid field
        Self(Value::String(value.to_string()))
    }
}

impl From<Uuid> for KeyValues {
    fn from(value: Uuid) -> Self {
        Self(vec![KeyValue::from(value)])
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered key values for a single- or multi-field primary key
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyValues(Vec<KeyValue>);

impl KeyValues {
    /// Creates key values from components in declared key order
    pub fn new(values: Vec<KeyValue>) -> Self {
        Self(values)
    }

    /// Number of key components
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no components
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the components in order
    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Returns true if any component is null
    pub fn has_null(&self) -> bool {
        self.0.iter().any(KeyValue::is_null)
    }

    /// Canonical encoding used for identity comparisons
    pub fn to_row_key(&self) -> RowKey {
        let array = Value::Array(self.0.iter().map(|v| v.0.clone()).collect());
        RowKey(array.to_string())
    }
}

impl From<KeyValue> for KeyValues {
    fn from(value: KeyValue) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<KeyValue>> for KeyValues {
    fn from(values: Vec<KeyValue>) -> Self {
        Self(values)
    }
}

impl<A, B> From<(A, B)> for KeyValues
where
    A: Into<KeyValue>,
    B: Into<KeyValue>,
{
    fn from((a, b): (A, B)) -> Self {
        Self(vec![a.into(), b.into()])
    }
}

impl<A, B, C> From<(A, B, C)> for KeyValues
where
    A: Into<KeyValue>,
    B: Into<KeyValue>,
    C: Into<KeyValue>,
{
    fn from((a, b, c): (A, B, C)) -> Self {
        Self(vec![a.into(), b.into(), c.into()])
    }
}

impl fmt::Display for KeyValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

/// Canonical, hashable identity of a row within its collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(String);

impl RowKey {
    /// Wraps an already-canonical encoding, as read back from a store
    pub fn from_canonical(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Returns the canonical encoding
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
