//! DML execution: row counts, generated-values requests, and protocol
//! violations.

use std::sync::Arc;

use sql_reactive_bridge::prelude::*;
use sql_reactive_bridge::test_utils::{
    BindLog, MockConnection, MockConnectionFactory, MockResultSpec, Signal, TestSubscriber,
};

struct UpdateQuery {
    returning: Vec<String>,
    native_returning: bool,
}

impl UpdateQuery {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            returning: Vec::new(),
            native_returning: true,
        })
    }

    fn returning(columns: &[&str], native: bool) -> Arc<Self> {
        Arc::new(Self {
            returning: columns.iter().map(|c| (*c).to_string()).collect(),
            native_returning: native,
        })
    }
}

impl SqlQuery for UpdateQuery {
    fn render(&self, _settings: &RenderSettings) -> Result<Rendered, SqlBridgeError> {
        Ok(Rendered::new(
            "UPDATE t SET a = $1 WHERE b = $2",
            vec![
                Param::new(SqlType::BigInt, RowValues::Int(9)),
                Param::new(SqlType::Varchar, RowValues::Null),
            ],
        ))
    }

    fn render_inlined(&self) -> Result<String, SqlBridgeError> {
        Ok("UPDATE t SET a = 9 WHERE b = NULL".into())
    }
}

impl DmlQuery for UpdateQuery {
    fn returning(&self) -> &[String] {
        &self.returning
    }

    fn native_support_returning(&self) -> bool {
        self.native_returning
    }
}

fn setup(
    specs: Vec<MockResultSpec>,
) -> (Arc<MockConnectionFactory>, Arc<MockConnection>, ConfigAndFactory) {
    let connection = MockConnection::new(specs);
    let factory = MockConnectionFactory::new(Arc::clone(&connection));
    let config = ConfigAndFactory::new(
        Arc::clone(&factory) as Arc<dyn sql_reactive_bridge::driver::ConnectionFactory>,
        DatabaseFamily::Postgres,
    );
    (factory, connection, config)
}

#[test]
fn dml_delivers_one_count_then_completes() {
    let (_, connection, config) = setup(vec![MockResultSpec::RowCount(42)]);
    let publisher = RowCountPublisher::for_dml(&config, UpdateQuery::new());

    let subscriber = TestSubscriber::<u64>::new();
    publisher.subscribe(subscriber.clone());
    subscriber.request(i64::MAX);

    assert_eq!(subscriber.items(), vec![42]);
    assert!(subscriber.completed());
    assert_eq!(
        subscriber.signals(),
        vec![Signal::Subscribe, Signal::Next, Signal::Complete]
    );
    assert_eq!(connection.close_subscriptions(), 1);
}

#[test]
fn bind_values_walk_through_the_parameter_adapter() {
    use sql_reactive_bridge::driver::{Value, ValueType};

    let (_, connection, config) = setup(vec![MockResultSpec::RowCount(1)]);
    let publisher = RowCountPublisher::for_dml(&config, UpdateQuery::new());

    let subscriber = TestSubscriber::<u64>::new();
    publisher.subscribe(subscriber.clone());
    subscriber.request(1);

    let log = connection.statement_log();
    assert_eq!(log.len(), 1);
    // 1-based library indices land on 0-based driver slots; NULL binds with
    // its substituted driver type.
    assert_eq!(
        log[0].binds,
        vec![
            BindLog::Value(0, Value::Integer(9)),
            BindLog::Null(1, ValueType::Text),
        ]
    );
}

#[test]
fn non_native_returning_requests_generated_values() {
    let (_, connection, config) = setup(vec![MockResultSpec::RowCount(1)]);
    let publisher =
        RowCountPublisher::for_dml(&config, UpdateQuery::returning(&["id", "version"], false));

    let subscriber = TestSubscriber::<u64>::new();
    publisher.subscribe(subscriber.clone());
    subscriber.request(1);

    let log = connection.statement_log();
    assert_eq!(log[0].returning, vec!["id".to_string(), "version".into()]);
}

#[test]
fn native_returning_skips_generated_values() {
    let (_, connection, config) = setup(vec![MockResultSpec::RowCount(1)]);
    let publisher =
        RowCountPublisher::for_dml(&config, UpdateQuery::returning(&["id"], true));

    let subscriber = TestSubscriber::<u64>::new();
    publisher.subscribe(subscriber.clone());
    subscriber.request(1);

    assert!(connection.statement_log()[0].returning.is_empty());
}

#[test]
fn invalid_request_errors_without_opening_a_connection() {
    let (factory, connection, config) = setup(vec![MockResultSpec::RowCount(42)]);
    let publisher = RowCountPublisher::for_dml(&config, UpdateQuery::new());

    let subscriber = TestSubscriber::<u64>::new();
    publisher.subscribe(subscriber.clone());
    subscriber.request(0);

    assert_eq!(subscriber.item_count(), 0);
    assert_eq!(subscriber.error_count(), 1);
    assert!(subscriber.first_error().unwrap().contains("3.9"));
    assert_eq!(factory.connect_subscriptions(), 0);
    assert_eq!(connection.close_subscriptions(), 0);

    // The violation is terminal: later valid requests stay no-ops.
    subscriber.request(1);
    assert_eq!(subscriber.item_count(), 0);
    assert_eq!(factory.connect_subscriptions(), 0);
}

#[test]
fn negative_request_is_equally_illegal() {
    let (_, _, config) = setup(vec![MockResultSpec::RowCount(42)]);
    let publisher = RowCountPublisher::for_dml(&config, UpdateQuery::new());

    let subscriber = TestSubscriber::<u64>::new();
    publisher.subscribe(subscriber.clone());
    subscriber.request(-5);

    assert_eq!(subscriber.error_count(), 1);
    assert!(!subscriber.completed());
}

#[test]
fn multiple_counts_stream_in_result_order_under_unbounded_demand() {
    let (_, _, config) = setup(vec![
        MockResultSpec::RowCount(1),
        MockResultSpec::RowCount(2),
        MockResultSpec::RowCount(3),
    ]);
    let publisher = RowCountPublisher::for_dml(&config, UpdateQuery::new());

    let subscriber = TestSubscriber::<u64>::new();
    publisher.subscribe(subscriber.clone());
    subscriber.request(i64::MAX);

    assert_eq!(subscriber.items(), vec![1, 2, 3]);
    assert!(subscriber.completed());
}

#[test]
fn exhausted_demand_parks_pending_results_until_the_next_request() {
    let (_, _, config) = setup(vec![
        MockResultSpec::RowCount(1),
        MockResultSpec::RowCount(2),
        MockResultSpec::RowCount(3),
    ]);
    let publisher = RowCountPublisher::for_dml(&config, UpdateQuery::new());

    let subscriber = TestSubscriber::<u64>::new();
    publisher.subscribe(subscriber.clone());

    subscriber.request(1);
    assert_eq!(subscriber.items(), vec![1]);
    assert!(!subscriber.completed());

    // The remaining result streams were never started; fresh demand tops
    // them up (the table is unordered, so only the set is guaranteed).
    subscriber.request(i64::MAX);
    let mut rest = subscriber.items().split_off(1);
    rest.sort_unstable();
    assert_eq!(rest, vec![2, 3]);
    assert!(subscriber.completed());
}
