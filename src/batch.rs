//! Batch execution: several independent statements in one round trip, or one
//! prepared statement bound against many rows.

use std::sync::Arc;

use crate::config::ConfigAndFactory;
use crate::error::SqlBridgeError;
use crate::exec::RowCountPublisher;
use crate::render::SqlQuery;
use crate::types::RowValues;

/// A batch of independent queries, each rendered with inlined bind values and
/// executed through one driver batch.
pub struct BatchMultiple {
    queries: Vec<Arc<dyn SqlQuery>>,
}

impl BatchMultiple {
    #[must_use]
    pub fn new(queries: Vec<Arc<dyn SqlQuery>>) -> Self {
        Self { queries }
    }

    #[must_use]
    pub fn queries(&self) -> &[Arc<dyn SqlQuery>] {
        &self.queries
    }

    /// The row-count publisher executing this batch.
    #[must_use]
    pub fn publisher(self, config: &ConfigAndFactory) -> RowCountPublisher {
        RowCountPublisher::for_batch_multiple(config, self)
    }
}

/// One query bound against many rows of bind values, accumulated on a single
/// driver statement and executed once.
pub struct BatchSingle {
    query: Arc<dyn SqlQuery>,
    expected_bind_count: usize,
    rows: Vec<Vec<RowValues>>,
}

impl BatchSingle {
    #[must_use]
    pub fn new(query: Arc<dyn SqlQuery>, expected_bind_count: usize) -> Self {
        Self {
            query,
            expected_bind_count,
            rows: Vec::new(),
        }
    }

    /// Append one row of bind values.
    #[must_use]
    pub fn bind(mut self, row: Vec<RowValues>) -> Self {
        self.rows.push(row);
        self
    }

    #[must_use]
    pub fn query(&self) -> &Arc<dyn SqlQuery> {
        &self.query
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<RowValues>] {
        &self.rows
    }

    /// Validate the bind rows against the query's parameter count. Runs
    /// before rendering on every execution.
    ///
    /// # Errors
    ///
    /// Fails when any row's arity differs from the expected bind count.
    pub fn check_bind_values(&self) -> Result<(), SqlBridgeError> {
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != self.expected_bind_count {
                return Err(SqlBridgeError::batch(format!(
                    "bind row {i} has {} values, query expects {}",
                    row.len(),
                    self.expected_bind_count
                )));
            }
        }
        Ok(())
    }

    /// The row-count publisher executing this batch.
    #[must_use]
    pub fn publisher(self, config: &ConfigAndFactory) -> RowCountPublisher {
        RowCountPublisher::for_batch_single(config, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Rendered, RenderSettings};

    struct FixedQuery;

    impl SqlQuery for FixedQuery {
        fn render(&self, _settings: &RenderSettings) -> Result<Rendered, SqlBridgeError> {
            Ok(Rendered::new("INSERT INTO t (a, b) VALUES ($1, $2)", vec![]))
        }

        fn render_inlined(&self) -> Result<String, SqlBridgeError> {
            Ok("INSERT INTO t (a, b) VALUES (1, 2)".into())
        }
    }

    #[test]
    fn uniform_rows_pass_validation() {
        let batch = BatchSingle::new(Arc::new(FixedQuery), 2)
            .bind(vec![RowValues::Int(1), RowValues::Int(2)])
            .bind(vec![RowValues::Int(3), RowValues::Int(4)]);
        assert!(batch.check_bind_values().is_ok());
    }

    #[test]
    fn short_row_fails_validation() {
        let batch = BatchSingle::new(Arc::new(FixedQuery), 2)
            .bind(vec![RowValues::Int(1), RowValues::Int(2)])
            .bind(vec![RowValues::Int(3)]);
        let err = batch.check_bind_values().unwrap_err();
        assert!(matches!(err, SqlBridgeError::Batch(_)));
        assert!(err.to_string().contains("bind row 1"));
    }
}
