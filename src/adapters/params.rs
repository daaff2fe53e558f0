use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::driver::{Statement, Value, ValueType};
use crate::error::SqlBridgeError;
use crate::types::{DatabaseFamily, SqlType};

/// Temporal SQL types bind through the driver's local representations; the
/// rest map structurally.
pub(crate) fn substitute_type(ty: SqlType) -> ValueType {
    match ty {
        SqlType::Date => ValueType::LocalDate,
        SqlType::Time => ValueType::LocalTime,
        SqlType::Timestamp => ValueType::LocalDateTime,
        SqlType::BigInt => ValueType::Integer,
        SqlType::Double => ValueType::Float,
        SqlType::Varchar => ValueType::Text,
        SqlType::Boolean => ValueType::Boolean,
        SqlType::Json => ValueType::Json,
        SqlType::Blob => ValueType::Bytes,
    }
}

/// Typed setters over one driver statement, by 1-based parameter index.
///
/// The binder owns the shift to the driver's 0-based slots. NULL values issue
/// a typed `bind_null`; everything else issues `bind`.
pub struct StatementBinder<'a> {
    statement: &'a mut dyn Statement,
    family: DatabaseFamily,
}

impl<'a> StatementBinder<'a> {
    #[must_use]
    pub fn new(statement: &'a mut dyn Statement, family: DatabaseFamily) -> Self {
        Self { statement, family }
    }

    #[must_use]
    pub fn family(&self) -> DatabaseFamily {
        self.family
    }

    fn bind_slot(&mut self, index: usize, value: Value) -> Result<(), SqlBridgeError> {
        // Families whose drivers need marker-specific bind treatment branch
        // here; none currently do.
        match self.family {
            _ => self.statement.bind(index - 1, value),
        }
    }

    fn bind_null_slot(&mut self, index: usize, ty: ValueType) -> Result<(), SqlBridgeError> {
        match self.family {
            _ => self.statement.bind_null(index - 1, ty),
        }
    }

    /// # Errors
    /// Propagates driver bind failures.
    pub fn set_null(&mut self, index: usize, ty: SqlType) -> Result<(), SqlBridgeError> {
        self.bind_null_slot(index, substitute_type(ty))
    }

    /// # Errors
    /// Propagates driver bind failures.
    pub fn set_i64(&mut self, index: usize, value: i64) -> Result<(), SqlBridgeError> {
        self.bind_slot(index, Value::Integer(value))
    }

    /// # Errors
    /// Propagates driver bind failures.
    pub fn set_f64(&mut self, index: usize, value: f64) -> Result<(), SqlBridgeError> {
        self.bind_slot(index, Value::Float(value))
    }

    /// # Errors
    /// Propagates driver bind failures.
    pub fn set_bool(&mut self, index: usize, value: bool) -> Result<(), SqlBridgeError> {
        self.bind_slot(index, Value::Boolean(value))
    }

    /// # Errors
    /// Propagates driver bind failures.
    pub fn set_text(&mut self, index: usize, value: String) -> Result<(), SqlBridgeError> {
        self.bind_slot(index, Value::Text(value))
    }

    /// # Errors
    /// Propagates driver bind failures.
    pub fn set_bytes(&mut self, index: usize, value: Vec<u8>) -> Result<(), SqlBridgeError> {
        self.bind_slot(index, Value::Bytes(value))
    }

    /// # Errors
    /// Propagates driver bind failures.
    pub fn set_json(&mut self, index: usize, value: serde_json::Value) -> Result<(), SqlBridgeError> {
        self.bind_slot(index, Value::Json(value))
    }

    /// # Errors
    /// Propagates driver bind failures.
    pub fn set_date(&mut self, index: usize, value: NaiveDate) -> Result<(), SqlBridgeError> {
        self.bind_slot(index, Value::LocalDate(value))
    }

    /// # Errors
    /// Propagates driver bind failures.
    pub fn set_time(&mut self, index: usize, value: NaiveTime) -> Result<(), SqlBridgeError> {
        self.bind_slot(index, Value::LocalTime(value))
    }

    /// # Errors
    /// Propagates driver bind failures.
    pub fn set_timestamp(
        &mut self,
        index: usize,
        value: NaiveDateTime,
    ) -> Result<(), SqlBridgeError> {
        self.bind_slot(index, Value::LocalDateTime(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::QueryResult;
    use crate::stream::Publisher;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingStatement {
        binds: Vec<(usize, Value)>,
        nulls: Vec<(usize, ValueType)>,
    }

    impl Statement for RecordingStatement {
        fn bind(&mut self, index: usize, value: Value) -> Result<(), SqlBridgeError> {
            self.binds.push((index, value));
            Ok(())
        }

        fn bind_null(&mut self, index: usize, ty: ValueType) -> Result<(), SqlBridgeError> {
            self.nulls.push((index, ty));
            Ok(())
        }

        fn add(&mut self) -> Result<(), SqlBridgeError> {
            Ok(())
        }

        fn fetch_size(&mut self, _rows: u32) {}

        fn return_generated_values(&mut self, _columns: &[String]) {}

        fn execute(self: Box<Self>) -> Arc<dyn Publisher<Arc<dyn QueryResult>>> {
            unreachable!("not executed in binder tests")
        }
    }

    #[test]
    fn indices_shift_to_zero_based() {
        let mut stmt = RecordingStatement::default();
        let mut binder = StatementBinder::new(&mut stmt, DatabaseFamily::Postgres);
        binder.set_i64(1, 7).unwrap();
        binder.set_text(2, "x".into()).unwrap();

        assert_eq!(stmt.binds[0], (0, Value::Integer(7)));
        assert_eq!(stmt.binds[1], (1, Value::Text("x".into())));
    }

    #[test]
    fn nulls_bind_with_substituted_types() {
        let mut stmt = RecordingStatement::default();
        let mut binder = StatementBinder::new(&mut stmt, DatabaseFamily::Postgres);
        binder.set_null(1, SqlType::Timestamp).unwrap();
        binder.set_null(2, SqlType::Date).unwrap();
        binder.set_null(3, SqlType::Time).unwrap();
        binder.set_null(4, SqlType::BigInt).unwrap();

        assert_eq!(
            stmt.nulls,
            vec![
                (0, ValueType::LocalDateTime),
                (1, ValueType::LocalDate),
                (2, ValueType::LocalTime),
                (3, ValueType::Integer),
            ]
        );
    }

    #[test]
    fn temporal_values_bind_as_local_representations() {
        let mut stmt = RecordingStatement::default();
        let mut binder = StatementBinder::new(&mut stmt, DatabaseFamily::MySql);
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        binder.set_date(1, date).unwrap();
        assert_eq!(binder.family(), DatabaseFamily::MySql);

        assert_eq!(stmt.binds[0], (0, Value::LocalDate(date)));
    }
}
