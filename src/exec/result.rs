use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use crate::adapters::{MetadataAccessor, RowAccessor};
use crate::binding::BindingGetContext;
use crate::driver::{QueryResult, RowEvent};
use crate::error::SqlBridgeError;
use crate::exec::forward::Forwarder;
use crate::exec::subscription::SubscriptionInner;
use crate::render::RecordQuery;
use crate::results::{Record, RecordSchema};
use crate::stream::{Subscriber, Subscription};

/// How one flavour of subscription turns a driver result into a stream of
/// downstream elements.
trait ResultHandler<E: Send + 'static>: Send + Sync {
    fn on_result(
        &self,
        result: &Arc<dyn QueryResult>,
        subscription: &Arc<SubscriptionInner<E>>,
        owner: &Arc<ResultStreamSubscriber<E>>,
    );
}

/// Consumes the stream of results from one executed statement or batch.
///
/// Requests unbounded demand: the driver's result stream is already paced by
/// its own result boundaries; per-row pacing happens in the forwarders. Holds
/// only a weak reference to the subscription, which owns the whole pipeline.
pub(crate) struct ResultStreamSubscriber<E: Send + 'static> {
    this: Weak<ResultStreamSubscriber<E>>,
    subscription: Weak<SubscriptionInner<E>>,
    completed: AtomicBool,
    handler: Box<dyn ResultHandler<E>>,
}

impl<E: Send + 'static> ResultStreamSubscriber<E> {
    fn with_handler(
        subscription: &Arc<SubscriptionInner<E>>,
        handler: Box<dyn ResultHandler<E>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            subscription: Arc::downgrade(subscription),
            completed: AtomicBool::new(false),
            handler,
        })
    }

    pub(crate) fn subscription(&self) -> Option<Arc<SubscriptionInner<E>>> {
        self.subscription.upgrade()
    }

    /// Close the subscription iff the result stream is drained AND every
    /// forwarder has completed.
    pub(crate) fn try_complete(&self) {
        if self.completed.load(Ordering::Acquire)
            && let Some(subscription) = self.subscription.upgrade()
            && !subscription.has_forwarders()
        {
            subscription.complete(false);
        }
    }
}

impl ResultStreamSubscriber<u64> {
    /// Row-count flavour: used by DML queries and batches.
    pub(crate) fn row_counts(subscription: &Arc<SubscriptionInner<u64>>) -> Arc<Self> {
        Self::with_handler(subscription, Box::new(RowCountHandler))
    }
}

impl ResultStreamSubscriber<Record> {
    /// Record flavour: rows map through the query's field bindings.
    pub(crate) fn records(
        subscription: &Arc<SubscriptionInner<Record>>,
        query: Arc<dyn RecordQuery>,
    ) -> Arc<Self> {
        Self::with_handler(
            subscription,
            Box::new(RecordHandler {
                query,
                fields: Arc::new(OnceLock::new()),
            }),
        )
    }
}

impl<E: Send + 'static> Subscriber<Arc<dyn QueryResult>> for ResultStreamSubscriber<E> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        subscription.request(i64::MAX);
    }

    fn on_next(&self, result: Arc<dyn QueryResult>) {
        let (Some(subscription), Some(this)) = (self.subscription.upgrade(), self.this.upgrade())
        else {
            return;
        };
        if subscription.completed() {
            return;
        }
        self.handler.on_result(&result, &subscription, &this);
    }

    fn on_error(&self, error: SqlBridgeError) {
        if let Some(subscription) = self.subscription.upgrade() {
            subscription.error(error);
        }
    }

    fn on_complete(&self) {
        self.completed.store(true, Ordering::Release);
        self.try_complete();
    }
}

/// Row-count results: one forwarder per result over `rows_updated`.
struct RowCountHandler;

impl ResultHandler<u64> for RowCountHandler {
    fn on_result(
        &self,
        result: &Arc<dyn QueryResult>,
        subscription: &Arc<SubscriptionInner<u64>>,
        owner: &Arc<ResultStreamSubscriber<u64>>,
    ) {
        let forwarder = Forwarder::register(subscription, owner, Some);
        result.rows_updated().subscribe(forwarder);
    }
}

/// Field list resolved once per statement execution; it cannot change within
/// one query.
struct ResolvedFields {
    defs: Vec<crate::binding::FieldDef>,
    schema: Arc<RecordSchema>,
}

/// Record results: one forwarder per result over the row publisher, mapping
/// each row through the binding layer.
struct RecordHandler {
    query: Arc<dyn RecordQuery>,
    fields: Arc<OnceLock<Arc<ResolvedFields>>>,
}

impl ResultHandler<Record> for RecordHandler {
    fn on_result(
        &self,
        result: &Arc<dyn QueryResult>,
        subscription: &Arc<SubscriptionInner<Record>>,
        owner: &Arc<ResultStreamSubscriber<Record>>,
    ) {
        let query = Arc::clone(&self.query);
        let fields = Arc::clone(&self.fields);
        let error_channel = Arc::downgrade(subscription);

        let forwarder = Forwarder::register(subscription, owner, move |event: RowEvent| {
            match map_row(&query, &fields, &event) {
                Ok(record) => Some(record),
                Err(error) => {
                    // The offending row is suppressed; the error terminates
                    // the subscription.
                    if let Some(subscription) = error_channel.upgrade() {
                        subscription.error(error);
                    }
                    None
                }
            }
        });
        result.rows().subscribe(forwarder);
    }
}

fn resolved_fields(
    query: &Arc<dyn RecordQuery>,
    cache: &OnceLock<Arc<ResolvedFields>>,
    event: &RowEvent,
) -> Result<Arc<ResolvedFields>, SqlBridgeError> {
    if let Some(resolved) = cache.get() {
        return Ok(Arc::clone(resolved));
    }

    let metadata = MetadataAccessor::new(event.metadata.as_ref());
    let defs = query.fields(&metadata)?;
    let schema = RecordSchema::new(defs.iter().map(|f| f.name.clone()).collect());
    let resolved = Arc::new(ResolvedFields { defs, schema });

    // A concurrent resolver may have won; the first write sticks.
    let _ = cache.set(Arc::clone(&resolved));
    Ok(cache.get().map_or(resolved, Arc::clone))
}

fn map_row(
    query: &Arc<dyn RecordQuery>,
    cache: &OnceLock<Arc<ResolvedFields>>,
    event: &RowEvent,
) -> Result<Record, SqlBridgeError> {
    let resolved = resolved_fields(query, cache, event)?;

    let mut accessor = RowAccessor::new(event.row.as_ref());
    let mut record = query.new_record(Arc::clone(&resolved.schema));

    for (i, field) in resolved.defs.iter().enumerate() {
        let column = i + 1;
        let mut ctx = BindingGetContext::new(&mut accessor, column);
        let value = field.binding.get(&mut ctx).map_err(|error| match error {
            mapping @ SqlBridgeError::Mapping { .. } => mapping,
            other => SqlBridgeError::Mapping {
                column,
                message: other.to_string(),
            },
        })?;
        record.set_value(column, value);
    }

    Ok(record)
}
