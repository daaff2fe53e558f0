/*!
 * SQL Reactive Bridge - demand-driven execution of SQL queries
 *
 * This crate adapts synchronously built SQL queries and batches onto a
 * reactive, non-blocking database driver interface. Each query or batch is
 * exposed as a publisher of records (or row counts) following the
 * reactive-streams protocol: demand-driven, one producer per subscriber, with
 * strict back-pressure, cancellation, and termination rules.
 *
 * # Features
 *
 * - Lazy execution: the connection is acquired on the first positive request
 * - Cumulative demand up to `i64::MAX` ("unbounded"), saturating
 * - Re-entrancy safe: `request` may be called synchronously from `on_next`
 * - Exactly-once connection close on completion, error, and cancel
 * - Per-row pacing through forwarders, bounding in-flight items
 * - A legacy blocking path behind the `blocking` feature
 *
 * # Example
 *
 * ```rust,no_run
 * use std::sync::Arc;
 * use sql_reactive_bridge::prelude::*;
 * use sql_reactive_bridge::driver::ConnectionFactory;
 *
 * fn run(factory: Arc<dyn ConnectionFactory>, query: Arc<dyn RecordQuery>) {
 *     let config = ConfigAndFactory::new(factory, DatabaseFamily::Postgres);
 *     let publisher = RecordPublisher::new(&config, query);
 *
 *     // Subscribe any reactive-streams subscriber; records start flowing
 *     // once it requests demand.
 *     # let _ = publisher;
 * }
 * ```
 */

#![forbid(unsafe_code)]

// Core modules
pub mod adapters;
pub mod batch;
pub mod binding;
pub mod config;
pub mod demand;
pub mod driver;
pub mod error;
pub mod exec;
pub mod render;
pub mod results;
pub mod stream;
pub mod types;

// Legacy blocking path - parallel implementation of the subscription
// contract, no shared mutable state with the non-blocking engine
#[cfg(feature = "blocking")]
pub mod blocking;

// Test utilities module - only compiled with the test-utils feature
#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-export everything that should be part of the public API
pub mod prelude {
    //! Convenient imports for common functionality.

    pub use crate::batch::{BatchMultiple, BatchSingle};
    pub use crate::binding::{FieldBinding, FieldDef, Param, ParamBinding};
    pub use crate::config::{ConfigAndFactory, get_connection, get_connection_with_credentials};
    pub use crate::error::SqlBridgeError;
    pub use crate::exec::{RecordPublisher, RowCountPublisher};
    pub use crate::render::{DmlQuery, RecordQuery, RenderSettings, Rendered, SqlQuery};
    pub use crate::results::{Record, RecordSchema};
    pub use crate::stream::{Publisher, Subscriber, Subscription};
    pub use crate::types::{ColumnNullability, DatabaseFamily, RowValues, SqlType};

    #[cfg(feature = "blocking")]
    pub use crate::blocking::{
        BlockingRecordPublisher, BlockingRowCountPublisher, CountQuery, CursorQuery, RecordCursor,
    };
}

// Direct exports of frequently used types for simplicity
pub use batch::{BatchMultiple, BatchSingle};
pub use config::ConfigAndFactory;
pub use error::SqlBridgeError;
pub use exec::{RecordPublisher, RowCountPublisher};
pub use render::{RecordQuery, RenderSettings, Rendered, SqlQuery};
pub use results::{Record, RecordSchema};
pub use types::{DatabaseFamily, RowValues, SqlType};

/// Lock a mutex, recovering the data from a poisoned lock instead of
/// propagating the panic.
pub(crate) fn lock_recovered<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
