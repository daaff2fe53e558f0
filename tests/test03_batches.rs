//! Batch execution: multi-statement batches with inlined rendering, and
//! single-statement batches binding many rows.

use std::sync::Arc;

use sql_reactive_bridge::driver::{Value, ValueType};
use sql_reactive_bridge::prelude::*;
use sql_reactive_bridge::test_utils::{
    BindLog, MockConnection, MockConnectionFactory, MockResultSpec, TestSubscriber,
};

struct InsertQuery {
    bind_count: usize,
}

impl SqlQuery for InsertQuery {
    fn render(&self, _settings: &RenderSettings) -> Result<Rendered, SqlBridgeError> {
        let bind_values = if self.bind_count == 0 {
            Vec::new()
        } else {
            vec![
                Param::new(SqlType::BigInt, RowValues::Null),
                Param::new(SqlType::Varchar, RowValues::Null),
            ]
        };
        Ok(Rendered::new("INSERT INTO t (a, b) VALUES ($1, $2)", bind_values))
    }

    fn render_inlined(&self) -> Result<String, SqlBridgeError> {
        Ok("INSERT INTO t (a, b) VALUES (1, 'x')".into())
    }
}

fn setup(
    specs: Vec<MockResultSpec>,
) -> (Arc<MockConnection>, ConfigAndFactory) {
    let connection = MockConnection::new(specs);
    let factory = MockConnectionFactory::new(Arc::clone(&connection));
    let config = ConfigAndFactory::new(
        Arc::clone(&factory) as Arc<dyn sql_reactive_bridge::driver::ConnectionFactory>,
        DatabaseFamily::Postgres,
    );
    (connection, config)
}

struct DeleteQuery;

impl SqlQuery for DeleteQuery {
    fn render(&self, _settings: &RenderSettings) -> Result<Rendered, SqlBridgeError> {
        Ok(Rendered::new("DELETE FROM t", Vec::new()))
    }

    fn render_inlined(&self) -> Result<String, SqlBridgeError> {
        Ok("DELETE FROM t".into())
    }
}

#[test]
fn multi_statement_batch_appends_inlined_sql() {
    let (connection, config) = setup(vec![
        MockResultSpec::RowCount(1),
        MockResultSpec::RowCount(7),
    ]);

    let batch = BatchMultiple::new(vec![
        Arc::new(InsertQuery { bind_count: 2 }),
        Arc::new(DeleteQuery),
    ]);
    let publisher = batch.publisher(&config);

    let subscriber = TestSubscriber::<u64>::new();
    publisher.subscribe(subscriber.clone());
    subscriber.request(i64::MAX);

    assert_eq!(subscriber.items(), vec![1, 7]);
    assert!(subscriber.completed());
    assert_eq!(connection.close_subscriptions(), 1);

    // Inlined SQL, no bind phase: the batch saw full statements and the
    // statement log stayed empty.
    assert_eq!(
        connection.batch_log(),
        vec![vec![
            "INSERT INTO t (a, b) VALUES (1, 'x')".to_string(),
            "DELETE FROM t".to_string(),
        ]]
    );
    assert!(connection.statement_log().is_empty());
}

#[test]
fn single_statement_batch_binds_every_row_through_rendered_params() {
    let (connection, config) = setup(vec![
        MockResultSpec::RowCount(1),
        MockResultSpec::RowCount(1),
    ]);

    let batch = BatchSingle::new(Arc::new(InsertQuery { bind_count: 2 }), 2)
        .bind(vec![RowValues::Int(1), RowValues::Text("a".into())])
        .bind(vec![RowValues::Int(2), RowValues::Null]);
    let publisher = batch.publisher(&config);

    let subscriber = TestSubscriber::<u64>::new();
    publisher.subscribe(subscriber.clone());
    subscriber.request(i64::MAX);

    assert_eq!(subscriber.items(), vec![1, 1]);
    assert!(subscriber.completed());

    let log = connection.statement_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].adds, 2);
    // Types come from the rendered parameter list, so the NULL in row two
    // binds as the declared varchar.
    assert_eq!(
        log[0].binds,
        vec![
            BindLog::Value(0, Value::Integer(1)),
            BindLog::Value(1, Value::Text("a".into())),
            BindLog::Value(0, Value::Integer(2)),
            BindLog::Null(1, ValueType::Text),
        ]
    );
}

#[test]
fn single_statement_batch_infers_types_without_rendered_params() {
    let (connection, config) = setup(vec![MockResultSpec::RowCount(2)]);

    let batch = BatchSingle::new(Arc::new(InsertQuery { bind_count: 0 }), 2)
        .bind(vec![RowValues::Int(5), RowValues::Null]);
    let publisher = batch.publisher(&config);

    let subscriber = TestSubscriber::<u64>::new();
    publisher.subscribe(subscriber.clone());
    subscriber.request(i64::MAX);

    assert_eq!(subscriber.items(), vec![2]);

    // With no rendered params, types are inferred from the raw values; a
    // NULL infers varchar.
    let log = connection.statement_log();
    assert_eq!(
        log[0].binds,
        vec![
            BindLog::Value(0, Value::Integer(5)),
            BindLog::Null(1, ValueType::Text),
        ]
    );
}

#[test]
fn mismatched_bind_row_fails_before_rendering() {
    let (connection, config) = setup(vec![MockResultSpec::RowCount(1)]);

    let batch = BatchSingle::new(Arc::new(InsertQuery { bind_count: 2 }), 2)
        .bind(vec![RowValues::Int(1), RowValues::Text("a".into())])
        .bind(vec![RowValues::Int(2)]);
    let publisher = batch.publisher(&config);

    let subscriber = TestSubscriber::<u64>::new();
    publisher.subscribe(subscriber.clone());
    subscriber.request(1);

    assert_eq!(subscriber.item_count(), 0);
    assert_eq!(subscriber.error_count(), 1);
    assert!(subscriber.first_error().unwrap().contains("bind row 1"));
    // The statement was never created, but the connection had been acquired
    // and must still be closed.
    assert!(connection.statement_log().is_empty());
    assert_eq!(connection.close_subscriptions(), 1);
}
