use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;

/// Values that can appear in a record field or be used as a bind value.
///
/// The same enum is shared between query input and result output so mapping
/// code never branches on driver types:
/// ```rust
/// use sql_reactive_bridge::prelude::*;
///
/// let bind_values = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = bind_values;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Date value
    Date(NaiveDate),
    /// Time-of-day value
    Time(NaiveTime),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

/// SQL-level type descriptors used by the binding layer.
///
/// These are the library's view of a column or parameter type. The adapters
/// substitute the temporal descriptors with the driver's local-date/time
/// representations before anything reaches the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    BigInt,
    Double,
    Varchar,
    Boolean,
    Date,
    Time,
    Timestamp,
    Json,
    Blob,
}

impl SqlType {
    /// Infer a type descriptor from a raw bind value.
    ///
    /// Used by single-statement batches when the rendered query carried no
    /// parameter list to borrow types from. NULL infers `Varchar`.
    #[must_use]
    pub fn of_value(value: &RowValues) -> SqlType {
        match value {
            RowValues::Int(_) => SqlType::BigInt,
            RowValues::Float(_) => SqlType::Double,
            RowValues::Text(_) | RowValues::Null => SqlType::Varchar,
            RowValues::Bool(_) => SqlType::Boolean,
            RowValues::Date(_) => SqlType::Date,
            RowValues::Time(_) => SqlType::Time,
            RowValues::Timestamp(_) => SqlType::Timestamp,
            RowValues::JSON(_) => SqlType::Json,
            RowValues::Blob(_) => SqlType::Blob,
        }
    }
}

/// Dialect family of the target database.
///
/// Families only matter at two seams: the named-parameter prefix used when
/// rendering, and the bind-override hook in the statement binder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseFamily {
    Postgres,
    MySql,
    MariaDb,
    SqlServer,
    Sqlite,
    Generic,
}

impl std::fmt::Display for DatabaseFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::MySql => write!(f, "MySQL"),
            Self::MariaDb => write!(f, "MariaDB"),
            Self::SqlServer => write!(f, "SQL Server"),
            Self::Sqlite => write!(f, "SQLite"),
            Self::Generic => write!(f, "Generic"),
        }
    }
}

/// Three-valued column nullability as the library reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnNullability {
    NotNull,
    Nullable,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_inference_from_values() {
        assert_eq!(SqlType::of_value(&RowValues::Int(7)), SqlType::BigInt);
        assert_eq!(SqlType::of_value(&RowValues::Null), SqlType::Varchar);
        assert_eq!(
            SqlType::of_value(&RowValues::Blob(vec![1, 2])),
            SqlType::Blob
        );
    }
}
