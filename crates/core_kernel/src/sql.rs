//! Raw statements passed through to the store
//!
//! Two entry points exist. A raw statement carries `?` placeholders and a
//! parameter list. An interpolated statement is written with `{}` holes, as
//! with `format!`, but every hole becomes a bound parameter; values are never
//! spliced into the SQL text.
//!
//! ```rust
//! use core_kernel::interpolated_sql;
//!
//! let id = 42_i64;
//! let stmt = interpolated_sql!("UPDATE products SET stock = {} WHERE id = {}", 0_i64, id)
//!     .into_statement()
//!     .unwrap();
//! assert_eq!(stmt.sql(), "UPDATE products SET stock = ? WHERE id = ?");
//! assert_eq!(stmt.params().len(), 2);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};

/// A bound statement parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Json(Value),
}

macro_rules! sql_value_from {
    ($variant:ident: $($ty:ty),*) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::$variant(value.into())
                }
            }
        )*
    };
}

sql_value_from!(Integer: i8, i16, i32, i64, u8, u16, u32);
sql_value_from!(Real: f32, f64);
sql_value_from!(Text: String, &str);
sql_value_from!(Bool: bool);
sql_value_from!(Json: Value);

impl From<uuid::Uuid> for SqlValue {
    fn from(value: uuid::Uuid) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// A statement with `?` placeholders and its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlStatement {
    /// Creates a raw statement
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidArgument` if the SQL text is blank.
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> CoreResult<Self> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            return Err(CoreError::invalid_argument("SQL statement must not be empty"));
        }
        Ok(Self { sql, params })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

/// A `format!`-style statement whose holes become bound parameters
///
/// Usually built with [`interpolated_sql!`](crate::interpolated_sql).
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedSql {
    template: String,
    args: Vec<SqlValue>,
}

impl InterpolatedSql {
    pub fn new(template: impl Into<String>, args: Vec<SqlValue>) -> Self {
        Self {
            template: template.into(),
            args,
        }
    }

    /// Converts holes into placeholders
    ///
    /// `{{` and `}}` escape literal braces.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidArgument` if the template is blank, contains
    /// an unsupported hole, or the number of holes differs from the number of
    /// arguments.
    pub fn into_statement(self) -> CoreResult<SqlStatement> {
        let mut sql = String::with_capacity(self.template.len());
        let mut holes = 0usize;
        let mut chars = self.template.chars().peekable();

        while let Some(c) = chars.next() {
            match (c, chars.peek()) {
                ('{', Some('{')) => {
                    chars.next();
                    sql.push('{');
                }
                ('}', Some('}')) => {
                    chars.next();
                    sql.push('}');
                }
                ('{', Some('}')) => {
                    chars.next();
                    sql.push('?');
                    holes += 1;
                }
                ('{', _) | ('}', _) => {
                    return Err(CoreError::invalid_argument(
                        "interpolated SQL supports only `{}` holes",
                    ));
                }
                _ => sql.push(c),
            }
        }

        if holes != self.args.len() {
            return Err(CoreError::invalid_argument(format!(
                "interpolated SQL has {} holes but {} arguments",
                holes,
                self.args.len()
            )));
        }
        SqlStatement::new(sql, self.args)
    }
}

/// Builds an [`InterpolatedSql`] from a template and arguments
#[macro_export]
macro_rules! interpolated_sql {
    ($template:expr $(, $arg:expr)* $(,)?) => {
        $crate::sql::InterpolatedSql::new(
            $template,
            vec![$($crate::sql::SqlValue::from($arg)),*],
        )
    };
}
