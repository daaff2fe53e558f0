use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::driver::{Row, Value, ValueType};
use crate::error::SqlBridgeError;

/// Typed accessors over one driver row, by 1-based column index.
///
/// Non-nullable accessors return a zero sentinel for absent values; nullable
/// accessors return `Option`. Either way `was_null` reflects exactly the most
/// recent read. Temporal columns are requested as the driver's local
/// representations, because the driver does not understand the library's SQL
/// temporal descriptors.
pub struct RowAccessor<'a> {
    row: &'a dyn Row,
    was_null: bool,
}

impl<'a> RowAccessor<'a> {
    #[must_use]
    pub fn new(row: &'a dyn Row) -> Self {
        Self {
            row,
            was_null: false,
        }
    }

    /// Whether the most recent column read found NULL.
    #[must_use]
    pub fn was_null(&self) -> bool {
        self.was_null
    }

    fn read(&mut self, index: usize, ty: ValueType) -> Result<Option<Value>, SqlBridgeError> {
        let value = self.row.get(index - 1, ty)?;
        self.was_null = value.is_none();
        Ok(value)
    }

    fn mismatch(index: usize, expected: ValueType, got: &Value) -> SqlBridgeError {
        SqlBridgeError::type_conversion(format!(
            "column {index}: expected {expected:?}, driver returned {got:?}"
        ))
    }

    /// # Errors
    /// Fails when the driver returns a non-integer value.
    pub fn get_i64(&mut self, index: usize) -> Result<i64, SqlBridgeError> {
        match self.read(index, ValueType::Integer)? {
            Some(Value::Integer(v)) => Ok(v),
            Some(other) => Err(Self::mismatch(index, ValueType::Integer, &other)),
            None => Ok(0),
        }
    }

    /// # Errors
    /// Fails when the driver returns a non-float value.
    pub fn get_f64(&mut self, index: usize) -> Result<f64, SqlBridgeError> {
        match self.read(index, ValueType::Float)? {
            Some(Value::Float(v)) => Ok(v),
            Some(other) => Err(Self::mismatch(index, ValueType::Float, &other)),
            None => Ok(0.0),
        }
    }

    /// # Errors
    /// Fails when the driver returns a non-boolean value.
    pub fn get_bool(&mut self, index: usize) -> Result<bool, SqlBridgeError> {
        match self.read(index, ValueType::Boolean)? {
            Some(Value::Boolean(v)) => Ok(v),
            Some(other) => Err(Self::mismatch(index, ValueType::Boolean, &other)),
            None => Ok(false),
        }
    }

    /// # Errors
    /// Fails when the driver returns a non-text value.
    pub fn get_text(&mut self, index: usize) -> Result<Option<String>, SqlBridgeError> {
        match self.read(index, ValueType::Text)? {
            Some(Value::Text(v)) => Ok(Some(v)),
            Some(other) => Err(Self::mismatch(index, ValueType::Text, &other)),
            None => Ok(None),
        }
    }

    /// # Errors
    /// Fails when the driver returns a non-binary value.
    pub fn get_bytes(&mut self, index: usize) -> Result<Option<Vec<u8>>, SqlBridgeError> {
        match self.read(index, ValueType::Bytes)? {
            Some(Value::Bytes(v)) => Ok(Some(v)),
            Some(other) => Err(Self::mismatch(index, ValueType::Bytes, &other)),
            None => Ok(None),
        }
    }

    /// # Errors
    /// Fails when the driver returns a non-JSON value.
    pub fn get_json(&mut self, index: usize) -> Result<Option<serde_json::Value>, SqlBridgeError> {
        match self.read(index, ValueType::Json)? {
            Some(Value::Json(v)) => Ok(Some(v)),
            Some(other) => Err(Self::mismatch(index, ValueType::Json, &other)),
            None => Ok(None),
        }
    }

    /// Date columns read through the driver's local-date representation.
    ///
    /// # Errors
    /// Fails when the driver returns something other than a local date.
    pub fn get_date(&mut self, index: usize) -> Result<Option<NaiveDate>, SqlBridgeError> {
        match self.read(index, ValueType::LocalDate)? {
            Some(Value::LocalDate(v)) => Ok(Some(v)),
            Some(other) => Err(Self::mismatch(index, ValueType::LocalDate, &other)),
            None => Ok(None),
        }
    }

    /// Time columns read through the driver's local-time representation.
    ///
    /// # Errors
    /// Fails when the driver returns something other than a local time.
    pub fn get_time(&mut self, index: usize) -> Result<Option<NaiveTime>, SqlBridgeError> {
        match self.read(index, ValueType::LocalTime)? {
            Some(Value::LocalTime(v)) => Ok(Some(v)),
            Some(other) => Err(Self::mismatch(index, ValueType::LocalTime, &other)),
            None => Ok(None),
        }
    }

    /// Timestamp columns read through the driver's local-datetime
    /// representation.
    ///
    /// # Errors
    /// Fails when the driver returns something other than a local datetime.
    pub fn get_timestamp(&mut self, index: usize) -> Result<Option<NaiveDateTime>, SqlBridgeError> {
        match self.read(index, ValueType::LocalDateTime)? {
            Some(Value::LocalDateTime(v)) => Ok(Some(v)),
            Some(other) => Err(Self::mismatch(index, ValueType::LocalDateTime, &other)),
            None => Ok(None),
        }
    }
}
