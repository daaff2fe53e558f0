use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::batch::{BatchMultiple, BatchSingle};
use crate::config::ConfigAndFactory;
use crate::demand::{Demand, PumpGuard};
use crate::driver::{Connection, ConnectionFactory};
use crate::error::SqlBridgeError;
use crate::exec::connect::{
    ConnectionSubscriber, ExecuteBatchMultiple, ExecuteBatchSingle, ExecuteDml, ExecuteQuery,
};
use crate::exec::forward::ForwarderHandle;
use crate::lock_recovered;
use crate::render::{DmlQuery, RecordQuery};
use crate::results::Record;
use crate::stream::{CallbackSubscriber, Publisher, Subscriber, Subscription};

pub(crate) type ConnectionDelegate = Arc<dyn Subscriber<Arc<dyn Connection>>>;

/// Builds the connection subscriber when the subscription starts. Invoked at
/// most once per subscription, under the `subscribed` swap.
pub(crate) type Starter<E> =
    Arc<dyn Fn(Arc<SubscriptionInner<E>>) -> ConnectionDelegate + Send + Sync>;

/// Shared state of one non-blocking subscription.
///
/// The completed flag gates every terminal side effect: the first of
/// results-drained, upstream error, or downstream cancel wins the swap,
/// closes the connection, and (except for cancel) signals the downstream.
pub(crate) struct SubscriptionInner<E: Send + 'static> {
    this: Weak<SubscriptionInner<E>>,
    completed: AtomicBool,
    requested: Demand,
    guard: PumpGuard,
    subscriber: Arc<dyn Subscriber<E>>,
    subscribed: AtomicBool,
    connection_publisher: Arc<dyn Publisher<Arc<dyn Connection>>>,
    connection: Mutex<Option<Arc<dyn Connection>>>,
    forwarders: Mutex<HashMap<u64, Arc<dyn ForwarderHandle>>>,
    next_forwarder_index: AtomicU64,
    starter: Starter<E>,
}

impl<E: Send + 'static> SubscriptionInner<E> {
    pub(crate) fn new(
        subscriber: Arc<dyn Subscriber<E>>,
        connection_publisher: Arc<dyn Publisher<Arc<dyn Connection>>>,
        starter: Starter<E>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            completed: AtomicBool::new(false),
            requested: Demand::new(),
            guard: PumpGuard::new(),
            subscriber,
            subscribed: AtomicBool::new(false),
            connection_publisher,
            connection: Mutex::new(None),
            forwarders: Mutex::new(HashMap::new()),
            next_forwarder_index: AtomicU64::new(0),
            starter,
        })
    }

    /// The demand pump. Starts execution lazily on the first run, then tops
    /// up every live forwarder with one-item requests while demand lasts.
    fn request0(this: &Arc<Self>) {
        if !this.subscribed.swap(true, Ordering::AcqRel) {
            let delegate = (this.starter)(Arc::clone(this));
            this.connection_publisher.subscribe(delegate);
        }

        // Forwarders all feed the same downstream; snapshot the upstreams so
        // no lock is held while requesting (requests may re-enter).
        let upstreams: Vec<_> = lock_recovered(&this.forwarders)
            .values()
            .filter_map(|f| f.upstream())
            .collect();
        for upstream in upstreams {
            this.request1(&upstream);
        }
    }

    /// Pull one item from `upstream` iff downstream demand allows it.
    pub(crate) fn request1(&self, upstream: &Arc<dyn Subscription>) {
        if self.more_requested() {
            upstream.request(1);
        }
    }

    /// Consume one unit of demand. The only legal "may I emit one more?".
    pub(crate) fn more_requested(&self) -> bool {
        !self.completed.load(Ordering::Acquire) && self.requested.consume_one()
    }

    pub(crate) fn completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn emit(&self, item: E) {
        self.subscriber.on_next(item);
    }

    /// Terminal edge: all results delivered, or downstream cancelled.
    pub(crate) fn complete(&self, cancelled: bool) {
        if !self.completed.swap(true, Ordering::AcqRel) {
            self.shutdown();
            if !cancelled {
                self.subscriber.on_complete();
            }
        }
    }

    /// Terminal edge: any error. Loses against an earlier terminal signal,
    /// in which case the error is absorbed.
    pub(crate) fn error(&self, error: SqlBridgeError) {
        if !self.completed.swap(true, Ordering::AcqRel) {
            self.shutdown();
            self.subscriber.on_error(error);
        }
    }

    fn shutdown(&self) {
        lock_recovered(&self.forwarders).clear();
        self.close_connection();
    }

    /// Close-once: whoever swaps the connection out of the slot owns the
    /// close. The close publisher is fire-and-forget.
    fn close_connection(&self) {
        let connection = lock_recovered(&self.connection).take();
        if let Some(connection) = connection {
            tracing::debug!("closing connection");
            connection
                .close()
                .subscribe(Arc::new(CallbackSubscriber::discarding()));
        }
    }

    /// Park the connection in the slot, or close it immediately when a
    /// terminal signal won the race.
    pub(crate) fn store_connection(&self, connection: Arc<dyn Connection>) {
        let mut slot = lock_recovered(&self.connection);
        if self.completed.load(Ordering::Acquire) {
            drop(slot);
            connection
                .close()
                .subscribe(Arc::new(CallbackSubscriber::discarding()));
        } else {
            *slot = Some(connection);
        }
    }

    pub(crate) fn next_forwarder_index(&self) -> u64 {
        self.next_forwarder_index.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn insert_forwarder(&self, index: u64, forwarder: Arc<dyn ForwarderHandle>) {
        if !self.completed() {
            lock_recovered(&self.forwarders).insert(index, forwarder);
        }
    }

    pub(crate) fn remove_forwarder(&self, index: u64) {
        lock_recovered(&self.forwarders).remove(&index);
    }

    pub(crate) fn has_forwarders(&self) -> bool {
        !lock_recovered(&self.forwarders).is_empty()
    }
}

impl<E: Send + 'static> Subscription for SubscriptionInner<E> {
    fn request(&self, n: i64) {
        if n <= 0 {
            self.error(SqlBridgeError::InvalidRequest(n));
        } else if !self.completed() {
            self.requested.add(n);
            if let Some(this) = self.this.upgrade() {
                self.guard.run(|| Self::request0(&this));
            }
        }
    }

    fn cancel(&self) {
        self.complete(true);
    }
}

impl<E: Send + 'static> Drop for SubscriptionInner<E> {
    fn drop(&mut self) {
        // Backstop for a downstream that drops its handle without a terminal
        // signal; gated by the same slot swap as every other close.
        self.close_connection();
    }
}

struct BridgePublisher<E: Send + 'static> {
    factory: Arc<dyn ConnectionFactory>,
    starter: Starter<E>,
}

impl<E: Send + 'static> BridgePublisher<E> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<E>>) {
        let inner = SubscriptionInner::new(
            Arc::clone(&subscriber),
            self.factory.create(),
            Arc::clone(&self.starter),
        );
        subscriber.on_subscribe(inner);
    }
}

/// Publisher of mapped records for one result query.
///
/// Each `subscribe` starts an independent execution: the query is rendered
/// and run once a first positive request arrives.
pub struct RecordPublisher {
    inner: BridgePublisher<Record>,
}

impl RecordPublisher {
    #[must_use]
    pub fn new(config: &ConfigAndFactory, query: Arc<dyn RecordQuery>) -> Self {
        let settings = config.render_settings().clone();
        let family = config.family();
        let starter: Starter<Record> = Arc::new(move |subscription| {
            Arc::new(ConnectionSubscriber::new(
                subscription,
                Box::new(ExecuteQuery::new(
                    Arc::clone(&query),
                    settings.clone(),
                    family,
                )),
            ))
        });
        Self {
            inner: BridgePublisher {
                factory: Arc::clone(config.factory()),
                starter,
            },
        }
    }
}

impl Publisher<Record> for RecordPublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Record>>) {
        self.inner.subscribe(subscriber);
    }
}

/// Publisher of row counts, for DML queries and both batch flavours.
pub struct RowCountPublisher {
    inner: BridgePublisher<u64>,
}

impl RowCountPublisher {
    #[must_use]
    pub fn for_dml(config: &ConfigAndFactory, query: Arc<dyn DmlQuery>) -> Self {
        let settings = config.render_settings().clone();
        let family = config.family();
        let starter: Starter<u64> = Arc::new(move |subscription| {
            Arc::new(ConnectionSubscriber::new(
                subscription,
                Box::new(ExecuteDml::new(
                    Arc::clone(&query),
                    settings.clone(),
                    family,
                )),
            ))
        });
        Self::with_starter(config, starter)
    }

    #[must_use]
    pub fn for_batch_multiple(config: &ConfigAndFactory, batch: BatchMultiple) -> Self {
        let batch = Arc::new(batch);
        let starter: Starter<u64> = Arc::new(move |subscription| {
            Arc::new(ConnectionSubscriber::new(
                subscription,
                Box::new(ExecuteBatchMultiple::new(Arc::clone(&batch))),
            ))
        });
        Self::with_starter(config, starter)
    }

    #[must_use]
    pub fn for_batch_single(config: &ConfigAndFactory, batch: BatchSingle) -> Self {
        let settings = config.render_settings().clone();
        let family = config.family();
        let batch = Arc::new(batch);
        let starter: Starter<u64> = Arc::new(move |subscription| {
            Arc::new(ConnectionSubscriber::new(
                subscription,
                Box::new(ExecuteBatchSingle::new(
                    Arc::clone(&batch),
                    settings.clone(),
                    family,
                )),
            ))
        });
        Self::with_starter(config, starter)
    }

    fn with_starter(config: &ConfigAndFactory, starter: Starter<u64>) -> Self {
        Self {
            inner: BridgePublisher {
                factory: Arc::clone(config.factory()),
                starter,
            },
        }
    }
}

impl Publisher<u64> for RowCountPublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<u64>>) {
        self.inner.subscribe(subscriber);
    }
}
