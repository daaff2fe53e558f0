use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

/// Column layout shared by every record of one query execution.
///
/// The field list cannot change within one query, so the schema is built once
/// per statement execution and handed to each record by `Arc`; records carry
/// no lookup state of their own. Indices are 1-based, like everywhere else on
/// the library side.
#[derive(Debug)]
pub struct RecordSchema {
    names: Vec<String>,
    index_by_name: HashMap<String, usize>,
}

impl RecordSchema {
    /// Build a shared schema. With duplicate column names, lookups resolve to
    /// the first occurrence.
    #[must_use]
    pub fn new(names: Vec<String>) -> Arc<Self> {
        let mut index_by_name = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index_by_name.entry(name.clone()).or_insert(i + 1);
        }
        Arc::new(Self {
            names,
            index_by_name,
        })
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.names.len()
    }

    /// The 1-based index of a column, if present.
    #[must_use]
    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.index_by_name.get(column).copied()
    }

    /// The name of the column at a 1-based index.
    #[must_use]
    pub fn column_name(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A materialized record produced by one query execution.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<RecordSchema>,
    values: Vec<RowValues>,
}

impl Record {
    /// An empty record (every field NULL) over a shared schema, to be filled
    /// by the binding layer. This is the default record factory.
    #[must_use]
    pub fn empty(schema: Arc<RecordSchema>) -> Self {
        let values = vec![RowValues::Null; schema.column_count()];
        Self { schema, values }
    }

    /// Overwrite one field by 1-based index. Out-of-range writes are ignored.
    pub fn set_value(&mut self, index: usize, value: RowValues) {
        if let Some(slot) = index.checked_sub(1).and_then(|i| self.values.get_mut(i)) {
            *slot = value;
        }
    }

    /// Look a value up by column name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&RowValues> {
        self.get_at(self.schema.index_of(column)?)
    }

    /// Look a value up by 1-based column index.
    #[must_use]
    pub fn get_at(&self, index: usize) -> Option<&RowValues> {
        index.checked_sub(1).and_then(|i| self.values.get(i))
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
