//! Test support: a scripted in-memory driver and a collecting subscriber.
//!
//! The mock driver implements the full driver SPI against scripted result
//! specs, logging every statement, bind, and close so tests can assert the
//! exact driver interaction. Emission is demand-correct: the scripted
//! publishers use the same [`Demand`]/[`PumpGuard`] pair as the engine, so a
//! synchronous `request` from within `on_next` drains iteratively instead of
//! recursing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::demand::{Demand, PumpGuard};
use crate::driver::{
    Batch, Connection, ConnectionFactory, ConnectionFactoryProvider, ConnectionOptions,
    Nullability, QueryResult, Row, RowEvent, RowMetadata, Statement, TypeInfo, Value, ValueType,
};
use crate::error::SqlBridgeError;
use crate::lock_recovered;
use crate::stream::{Publisher, Subscriber, Subscription};

// ---------------------------------------------------------------------------
// Scripted publisher
// ---------------------------------------------------------------------------

/// Emits a fixed list of items under downstream demand, then completes (or
/// errors, when scripted to).
pub struct ScriptedPublisher<T: Clone + Send + Sync + 'static> {
    items: Vec<T>,
    error: Option<String>,
}

impl<T: Clone + Send + Sync + 'static> ScriptedPublisher<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self { items, error: None }
    }

    /// Terminate with a driver error instead of completion.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

impl<T: Clone + Send + Sync + 'static> Publisher<T> for ScriptedPublisher<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let subscription = Arc::new(ScriptedSubscription {
            queue: Mutex::new(self.items.iter().cloned().collect()),
            error: Mutex::new(self.error.clone()),
            subscriber: Arc::clone(&subscriber),
            demand: Demand::new(),
            guard: PumpGuard::new(),
            terminated: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        });
        subscriber.on_subscribe(subscription);
    }
}

struct ScriptedSubscription<T: Send + 'static> {
    queue: Mutex<VecDeque<T>>,
    error: Mutex<Option<String>>,
    subscriber: Arc<dyn Subscriber<T>>,
    demand: Demand,
    guard: PumpGuard,
    terminated: AtomicBool,
    cancelled: AtomicBool,
}

impl<T: Send + 'static> ScriptedSubscription<T> {
    fn drain(&self) {
        loop {
            if self.cancelled.load(Ordering::Acquire) || self.terminated.load(Ordering::Acquire) {
                return;
            }

            let next = {
                let mut queue = lock_recovered(&self.queue);
                if queue.is_empty() {
                    None
                } else if self.demand.consume_one() {
                    queue.pop_front()
                } else {
                    return;
                }
            };

            match next {
                Some(item) => self.subscriber.on_next(item),
                None => {
                    if !self.terminated.swap(true, Ordering::AcqRel) {
                        let error = lock_recovered(&self.error).take();
                        match error {
                            Some(message) => self.subscriber.on_error(SqlBridgeError::driver(message)),
                            None => self.subscriber.on_complete(),
                        }
                    }
                    return;
                }
            }
        }
    }
}

impl<T: Send + 'static> Subscription for ScriptedSubscription<T> {
    fn request(&self, n: i64) {
        if n > 0 {
            self.demand.add(n);
            self.guard.run(|| self.drain());
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Mock driver
// ---------------------------------------------------------------------------

/// One scripted statement outcome.
#[derive(Clone, Debug)]
pub enum MockResultSpec {
    /// A row-bearing result.
    Rows {
        columns: Vec<MockColumn>,
        rows: Vec<Vec<Option<Value>>>,
    },
    /// A row-count result.
    RowCount(u64),
}

impl MockResultSpec {
    /// Convenience: a single-column integer result with one row per value.
    #[must_use]
    pub fn int_rows(name: &str, values: &[i64]) -> Self {
        Self::Rows {
            columns: vec![MockColumn::new(name, ValueType::Integer)],
            rows: values
                .iter()
                .map(|v| vec![Some(Value::Integer(*v))])
                .collect(),
        }
    }
}

/// Scripted column metadata.
#[derive(Clone, Debug)]
pub struct MockColumn {
    pub name: String,
    pub value_type: ValueType,
    pub nullability: Nullability,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub type_info: Option<String>,
}

impl MockColumn {
    #[must_use]
    pub fn new(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            nullability: Nullability::Nullable,
            precision: None,
            scale: None,
            type_info: Some(value_type.name().to_string()),
        }
    }

    /// Drop the native type descriptor (a driver predating descriptors).
    #[must_use]
    pub fn without_type_info(mut self) -> Self {
        self.type_info = None;
        self
    }
}

/// What one statement execution looked like to the driver.
#[derive(Clone, Debug)]
pub struct StatementLog {
    pub sql: String,
    pub binds: Vec<BindLog>,
    pub adds: u32,
    pub fetch_size: Option<u32>,
    pub returning: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BindLog {
    Value(usize, Value),
    Null(usize, ValueType),
}

#[derive(Default, Debug)]
struct MockConnectionState {
    statements: Mutex<Vec<StatementLog>>,
    batches: Mutex<Vec<Vec<String>>>,
    close_subscriptions: AtomicUsize,
}

/// A scripted connection: every executed statement or batch yields the
/// scripted results, and all driver interaction is logged.
#[derive(Debug)]
pub struct MockConnection {
    specs: Arc<Vec<MockResultSpec>>,
    state: Arc<MockConnectionState>,
    statement_failure: Option<String>,
}

impl MockConnection {
    #[must_use]
    pub fn new(specs: Vec<MockResultSpec>) -> Arc<Self> {
        Arc::new(Self {
            specs: Arc::new(specs),
            state: Arc::new(MockConnectionState::default()),
            statement_failure: None,
        })
    }

    /// Script `create_statement` to fail.
    #[must_use]
    pub fn failing_statements(message: &str) -> Arc<Self> {
        Arc::new(Self {
            specs: Arc::new(Vec::new()),
            state: Arc::new(MockConnectionState::default()),
            statement_failure: Some(message.to_string()),
        })
    }

    /// Every statement executed so far.
    #[must_use]
    pub fn statement_log(&self) -> Vec<StatementLog> {
        lock_recovered(&self.state.statements).clone()
    }

    /// Every batch executed so far, as lists of appended SQL strings.
    #[must_use]
    pub fn batch_log(&self) -> Vec<Vec<String>> {
        lock_recovered(&self.state.batches).clone()
    }

    /// How many times the close publisher has been subscribed to.
    #[must_use]
    pub fn close_subscriptions(&self) -> usize {
        self.state.close_subscriptions.load(Ordering::Acquire)
    }
}

impl Connection for MockConnection {
    fn create_statement(&self, sql: &str) -> Result<Box<dyn Statement>, SqlBridgeError> {
        if let Some(message) = &self.statement_failure {
            return Err(SqlBridgeError::driver(message.clone()));
        }
        Ok(Box::new(MockStatement {
            sql: sql.to_string(),
            binds: Vec::new(),
            adds: 0,
            fetch_size: None,
            returning: Vec::new(),
            specs: Arc::clone(&self.specs),
            state: Arc::clone(&self.state),
        }))
    }

    fn create_batch(&self) -> Result<Box<dyn Batch>, SqlBridgeError> {
        Ok(Box::new(MockBatch {
            statements: Vec::new(),
            specs: Arc::clone(&self.specs),
            state: Arc::clone(&self.state),
        }))
    }

    fn close(&self) -> Arc<dyn Publisher<()>> {
        Arc::new(ClosePublisher {
            state: Arc::clone(&self.state),
        })
    }
}

struct ClosePublisher {
    state: Arc<MockConnectionState>,
}

impl Publisher<()> for ClosePublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<()>>) {
        self.state
            .close_subscriptions
            .fetch_add(1, Ordering::AcqRel);
        ScriptedPublisher::<()>::new(Vec::new()).subscribe(subscriber);
    }
}

struct MockStatement {
    sql: String,
    binds: Vec<BindLog>,
    adds: u32,
    fetch_size: Option<u32>,
    returning: Vec<String>,
    specs: Arc<Vec<MockResultSpec>>,
    state: Arc<MockConnectionState>,
}

impl Statement for MockStatement {
    fn bind(&mut self, index: usize, value: Value) -> Result<(), SqlBridgeError> {
        self.binds.push(BindLog::Value(index, value));
        Ok(())
    }

    fn bind_null(&mut self, index: usize, ty: ValueType) -> Result<(), SqlBridgeError> {
        self.binds.push(BindLog::Null(index, ty));
        Ok(())
    }

    fn add(&mut self) -> Result<(), SqlBridgeError> {
        self.adds += 1;
        Ok(())
    }

    fn fetch_size(&mut self, rows: u32) {
        self.fetch_size = Some(rows);
    }

    fn return_generated_values(&mut self, columns: &[String]) {
        self.returning = columns.to_vec();
    }

    fn execute(self: Box<Self>) -> Arc<dyn Publisher<Arc<dyn QueryResult>>> {
        lock_recovered(&self.state.statements).push(StatementLog {
            sql: self.sql.clone(),
            binds: self.binds.clone(),
            adds: self.adds,
            fetch_size: self.fetch_size,
            returning: self.returning.clone(),
        });
        Arc::new(ScriptedPublisher::new(result_objects(&self.specs)))
    }
}

struct MockBatch {
    statements: Vec<String>,
    specs: Arc<Vec<MockResultSpec>>,
    state: Arc<MockConnectionState>,
}

impl Batch for MockBatch {
    fn add(&mut self, sql: &str) {
        self.statements.push(sql.to_string());
    }

    fn execute(self: Box<Self>) -> Arc<dyn Publisher<Arc<dyn QueryResult>>> {
        lock_recovered(&self.state.batches).push(self.statements.clone());
        Arc::new(ScriptedPublisher::new(result_objects(&self.specs)))
    }
}

fn result_objects(specs: &[MockResultSpec]) -> Vec<Arc<dyn QueryResult>> {
    specs
        .iter()
        .map(|spec| Arc::new(MockResult { spec: spec.clone() }) as Arc<dyn QueryResult>)
        .collect()
}

struct MockResult {
    spec: MockResultSpec,
}

impl QueryResult for MockResult {
    fn rows_updated(&self) -> Arc<dyn Publisher<u64>> {
        match &self.spec {
            MockResultSpec::RowCount(count) => Arc::new(ScriptedPublisher::new(vec![*count])),
            MockResultSpec::Rows { .. } => Arc::new(ScriptedPublisher::new(Vec::new())),
        }
    }

    fn rows(&self) -> Arc<dyn Publisher<RowEvent>> {
        match &self.spec {
            MockResultSpec::RowCount(_) => Arc::new(ScriptedPublisher::new(Vec::new())),
            MockResultSpec::Rows { columns, rows } => {
                let metadata: Arc<dyn RowMetadata> = Arc::new(MockMetadata {
                    columns: columns.clone(),
                });
                let events = rows
                    .iter()
                    .map(|values| RowEvent {
                        row: Arc::new(MockRow {
                            values: values.clone(),
                        }),
                        metadata: Arc::clone(&metadata),
                    })
                    .collect();
                Arc::new(ScriptedPublisher::new(events))
            }
        }
    }
}

struct MockRow {
    values: Vec<Option<Value>>,
}

impl Row for MockRow {
    fn get(&self, index: usize, _ty: ValueType) -> Result<Option<Value>, SqlBridgeError> {
        self.values
            .get(index)
            .cloned()
            .ok_or_else(|| SqlBridgeError::driver(format!("row has no column {index}")))
    }
}

/// Scripted row metadata, usable directly for adapter-level tests.
pub struct MockMetadata {
    columns: Vec<MockColumn>,
}

impl MockMetadata {
    #[must_use]
    pub fn new(columns: Vec<MockColumn>) -> Self {
        Self { columns }
    }
}

impl RowMetadata for MockMetadata {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|c| c.name.as_str())
    }

    fn precision(&self, index: usize) -> Option<u32> {
        self.columns.get(index).and_then(|c| c.precision)
    }

    fn scale(&self, index: usize) -> Option<u32> {
        self.columns.get(index).and_then(|c| c.scale)
    }

    fn nullability(&self, index: usize) -> Nullability {
        self.columns
            .get(index)
            .map_or(Nullability::Unknown, |c| c.nullability)
    }

    fn value_type(&self, index: usize) -> ValueType {
        self.columns
            .get(index)
            .map_or(ValueType::Text, |c| c.value_type)
    }

    fn type_info(&self, index: usize) -> Option<TypeInfo> {
        self.columns
            .get(index)
            .and_then(|c| c.type_info.as_deref().map(TypeInfo::new))
    }
}

/// A factory handing out one scripted connection, counting how often its
/// connection publisher is subscribed.
#[derive(Debug)]
pub struct MockConnectionFactory {
    connection: Arc<MockConnection>,
    connect_subscriptions: Arc<AtomicUsize>,
    failure: Option<String>,
    empty: bool,
}

impl MockConnectionFactory {
    #[must_use]
    pub fn new(connection: Arc<MockConnection>) -> Arc<Self> {
        Arc::new(Self {
            connection,
            connect_subscriptions: Arc::new(AtomicUsize::new(0)),
            failure: None,
            empty: false,
        })
    }

    /// A factory whose connection publisher errors instead of emitting.
    #[must_use]
    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            connection: MockConnection::new(Vec::new()),
            connect_subscriptions: Arc::new(AtomicUsize::new(0)),
            failure: Some(message.to_string()),
            empty: false,
        })
    }

    /// A factory whose connection publisher completes without emitting.
    #[must_use]
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            connection: MockConnection::new(Vec::new()),
            connect_subscriptions: Arc::new(AtomicUsize::new(0)),
            failure: None,
            empty: true,
        })
    }

    /// How many times the connection publisher has been subscribed to.
    #[must_use]
    pub fn connect_subscriptions(&self) -> usize {
        self.connect_subscriptions.load(Ordering::Acquire)
    }
}

impl ConnectionFactory for MockConnectionFactory {
    fn create(&self) -> Arc<dyn Publisher<Arc<dyn Connection>>> {
        Arc::new(ConnectPublisher {
            connection: Arc::clone(&self.connection),
            counter: Arc::clone(&self.connect_subscriptions),
            failure: self.failure.clone(),
            empty: self.empty,
        })
    }
}

struct ConnectPublisher {
    connection: Arc<MockConnection>,
    counter: Arc<AtomicUsize>,
    failure: Option<String>,
    empty: bool,
}

impl Publisher<Arc<dyn Connection>> for ConnectPublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Arc<dyn Connection>>>) {
        self.counter.fetch_add(1, Ordering::AcqRel);
        let publisher = match &self.failure {
            Some(message) => ScriptedPublisher::new(Vec::new()).with_error(message.clone()),
            None if self.empty => ScriptedPublisher::new(Vec::new()),
            None => ScriptedPublisher::new(vec![
                Arc::clone(&self.connection) as Arc<dyn Connection>
            ]),
        };
        publisher.subscribe(subscriber);
    }
}

/// A provider wrapping one mock factory, for registry-based tests.
pub struct MockProvider {
    factory: Arc<MockConnectionFactory>,
    type_info: bool,
}

impl MockProvider {
    #[must_use]
    pub fn new(factory: Arc<MockConnectionFactory>) -> Self {
        Self {
            factory,
            type_info: true,
        }
    }
}

impl ConnectionFactoryProvider for MockProvider {
    fn create_factory(
        &self,
        _options: &ConnectionOptions,
    ) -> Result<Arc<dyn ConnectionFactory>, SqlBridgeError> {
        Ok(Arc::clone(&self.factory) as Arc<dyn ConnectionFactory>)
    }

    fn supports_type_info(&self) -> bool {
        self.type_info
    }
}

// ---------------------------------------------------------------------------
// Collecting subscriber
// ---------------------------------------------------------------------------

/// Signals in arrival order, for ordering assertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Subscribe,
    Next,
    Error,
    Complete,
}

type Hook = Box<dyn FnMut(usize, &Arc<dyn Subscription>) + Send>;

struct TestSubscriberState<T> {
    subscription: Option<Arc<dyn Subscription>>,
    items: Vec<T>,
    errors: Vec<SqlBridgeError>,
    signals: Vec<Signal>,
}

/// Records every signal; optionally runs a hook synchronously from within
/// `on_next` (to exercise re-entrant `request` and mid-stream `cancel`).
pub struct TestSubscriber<T: Send> {
    state: Mutex<TestSubscriberState<T>>,
    hook: Mutex<Option<Hook>>,
}

impl<T: Send> TestSubscriber<T> {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TestSubscriberState {
                subscription: None,
                items: Vec::new(),
                errors: Vec::new(),
                signals: Vec::new(),
            }),
            hook: Mutex::new(None),
        })
    }

    /// The hook receives the 0-based index of the item just delivered and the
    /// subscription.
    #[must_use]
    pub fn with_hook(
        hook: impl FnMut(usize, &Arc<dyn Subscription>) + Send + 'static,
    ) -> Arc<Self> {
        let subscriber = Self::new();
        *lock_recovered(&subscriber.hook) = Some(Box::new(hook));
        subscriber
    }

    #[must_use]
    pub fn subscription(&self) -> Arc<dyn Subscription> {
        lock_recovered(&self.state)
            .subscription
            .clone()
            .expect("no subscription received")
    }

    pub fn request(&self, n: i64) {
        self.subscription().request(n);
    }

    pub fn cancel(&self) {
        self.subscription().cancel();
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        lock_recovered(&self.state).items.len()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        lock_recovered(&self.state).errors.len()
    }

    #[must_use]
    pub fn first_error(&self) -> Option<String> {
        lock_recovered(&self.state)
            .errors
            .first()
            .map(ToString::to_string)
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        lock_recovered(&self.state)
            .signals
            .contains(&Signal::Complete)
    }

    #[must_use]
    pub fn signals(&self) -> Vec<Signal> {
        lock_recovered(&self.state).signals.clone()
    }
}

impl<T: Send + Clone> TestSubscriber<T> {
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        lock_recovered(&self.state).items.clone()
    }
}

impl<T: Send> Subscriber<T> for TestSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let mut state = lock_recovered(&self.state);
        state.subscription = Some(subscription);
        state.signals.push(Signal::Subscribe);
    }

    fn on_next(&self, item: T) {
        let (index, subscription) = {
            let mut state = lock_recovered(&self.state);
            state.items.push(item);
            state.signals.push(Signal::Next);
            (state.items.len() - 1, state.subscription.clone())
        };

        // Check the hook out while it runs so a re-entrant on_next cannot
        // deadlock on the hook mutex.
        let hook = lock_recovered(&self.hook).take();
        if let Some(mut hook) = hook {
            if let Some(subscription) = &subscription {
                hook(index, subscription);
            }
            let mut slot = lock_recovered(&self.hook);
            if slot.is_none() {
                *slot = Some(hook);
            }
        }
    }

    fn on_error(&self, error: SqlBridgeError) {
        let mut state = lock_recovered(&self.state);
        state.errors.push(error);
        state.signals.push(Signal::Error);
    }

    fn on_complete(&self) {
        lock_recovered(&self.state).signals.push(Signal::Complete);
    }
}
