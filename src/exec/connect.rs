use std::sync::Arc;

use crate::adapters::StatementBinder;
use crate::batch::{BatchMultiple, BatchSingle};
use crate::binding::{Param, bind_all};
use crate::driver::Connection;
use crate::error::SqlBridgeError;
use crate::exec::result::ResultStreamSubscriber;
use crate::exec::subscription::SubscriptionInner;
use crate::render::{DmlQuery, RecordQuery, RenderSettings};
use crate::results::Record;
use crate::stream::{Subscriber, Subscription};
use crate::types::DatabaseFamily;

/// What to run once the connection arrives. One implementation per
/// subscription flavour; every synchronous failure inside `execute` routes to
/// the subscription's error channel.
pub(crate) trait ExecuteOnConnection<E: Send + 'static>: Send + Sync {
    fn execute(
        &self,
        connection: &Arc<dyn Connection>,
        subscription: &Arc<SubscriptionInner<E>>,
    ) -> Result<(), SqlBridgeError>;
}

/// Consumes the single connection emitted by the factory.
///
/// Requests exactly one item. Completion of the connection publisher is
/// ignored: the subscription terminates on result-stream completion, not on
/// connection-stream completion.
pub(crate) struct ConnectionSubscriber<E: Send + 'static> {
    subscription: Arc<SubscriptionInner<E>>,
    action: Box<dyn ExecuteOnConnection<E>>,
}

impl<E: Send + 'static> ConnectionSubscriber<E> {
    pub(crate) fn new(
        subscription: Arc<SubscriptionInner<E>>,
        action: Box<dyn ExecuteOnConnection<E>>,
    ) -> Self {
        Self {
            subscription,
            action,
        }
    }
}

impl<E: Send + 'static> Subscriber<Arc<dyn Connection>> for ConnectionSubscriber<E> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        subscription.request(1);
    }

    fn on_next(&self, connection: Arc<dyn Connection>) {
        self.subscription.store_connection(Arc::clone(&connection));
        if self.subscription.completed() {
            return;
        }
        if let Err(error) = self.action.execute(&connection, &self.subscription) {
            self.subscription.error(error);
        }
    }

    fn on_error(&self, error: SqlBridgeError) {
        self.subscription.error(error);
    }

    fn on_complete(&self) {}
}

/// Record query execution: render, bind, hint, execute.
pub(crate) struct ExecuteQuery {
    query: Arc<dyn RecordQuery>,
    settings: RenderSettings,
    family: DatabaseFamily,
}

impl ExecuteQuery {
    pub(crate) fn new(
        query: Arc<dyn RecordQuery>,
        settings: RenderSettings,
        family: DatabaseFamily,
    ) -> Self {
        Self {
            query,
            settings,
            family,
        }
    }
}

impl ExecuteOnConnection<Record> for ExecuteQuery {
    fn execute(
        &self,
        connection: &Arc<dyn Connection>,
        subscription: &Arc<SubscriptionInner<Record>>,
    ) -> Result<(), SqlBridgeError> {
        let rendered = self.query.render(&self.settings)?;
        let mut statement = connection.create_statement(&rendered.sql)?;

        {
            let mut binder = StatementBinder::new(statement.as_mut(), self.family);
            bind_all(&mut binder, &rendered.bind_values)?;
        }

        if let Some(rows) = self.query.fetch_size()
            && rows != 0
        {
            tracing::debug!(rows, "setting fetch size");
            statement.fetch_size(rows);
        }

        let results = ResultStreamSubscriber::records(subscription, Arc::clone(&self.query));
        statement.execute().subscribe(results);
        Ok(())
    }
}

/// DML execution: render, bind, request generated values where the dialect
/// cannot return them natively, execute.
pub(crate) struct ExecuteDml {
    query: Arc<dyn DmlQuery>,
    settings: RenderSettings,
    family: DatabaseFamily,
}

impl ExecuteDml {
    pub(crate) fn new(
        query: Arc<dyn DmlQuery>,
        settings: RenderSettings,
        family: DatabaseFamily,
    ) -> Self {
        Self {
            query,
            settings,
            family,
        }
    }
}

impl ExecuteOnConnection<u64> for ExecuteDml {
    fn execute(
        &self,
        connection: &Arc<dyn Connection>,
        subscription: &Arc<SubscriptionInner<u64>>,
    ) -> Result<(), SqlBridgeError> {
        let rendered = self.query.render(&self.settings)?;
        let mut statement = connection.create_statement(&rendered.sql)?;

        {
            let mut binder = StatementBinder::new(statement.as_mut(), self.family);
            bind_all(&mut binder, &rendered.bind_values)?;
        }

        let returning = self.query.returning();
        if !returning.is_empty() && !self.query.native_support_returning() {
            statement.return_generated_values(returning);
        }

        let results = ResultStreamSubscriber::row_counts(subscription);
        statement.execute().subscribe(results);
        Ok(())
    }
}

/// Multi-statement batch: every query rendered inlined, no bind phase.
pub(crate) struct ExecuteBatchMultiple {
    batch: Arc<BatchMultiple>,
}

impl ExecuteBatchMultiple {
    pub(crate) fn new(batch: Arc<BatchMultiple>) -> Self {
        Self { batch }
    }
}

impl ExecuteOnConnection<u64> for ExecuteBatchMultiple {
    fn execute(
        &self,
        connection: &Arc<dyn Connection>,
        subscription: &Arc<SubscriptionInner<u64>>,
    ) -> Result<(), SqlBridgeError> {
        let mut batch = connection.create_batch()?;
        for query in self.batch.queries() {
            batch.add(&query.render_inlined()?);
        }

        let results = ResultStreamSubscriber::row_counts(subscription);
        batch.execute().subscribe(results);
        Ok(())
    }
}

/// Single-statement batch: render once, bind and accumulate every row, then
/// execute once.
pub(crate) struct ExecuteBatchSingle {
    batch: Arc<BatchSingle>,
    settings: RenderSettings,
    family: DatabaseFamily,
}

impl ExecuteBatchSingle {
    pub(crate) fn new(
        batch: Arc<BatchSingle>,
        settings: RenderSettings,
        family: DatabaseFamily,
    ) -> Self {
        Self {
            batch,
            settings,
            family,
        }
    }
}

impl ExecuteOnConnection<u64> for ExecuteBatchSingle {
    fn execute(
        &self,
        connection: &Arc<dyn Connection>,
        subscription: &Arc<SubscriptionInner<u64>>,
    ) -> Result<(), SqlBridgeError> {
        self.batch.check_bind_values()?;

        let rendered = self.batch.query().render(&self.settings)?;
        let mut statement = connection.create_statement(&rendered.sql)?;

        for row in self.batch.rows() {
            // Bind through the rendered parameter list to preserve declared
            // types; a plain-SQL query has none, so infer from the values.
            let params: Vec<Param> = if rendered.bind_values.is_empty() {
                row.iter().cloned().map(Param::of_value).collect()
            } else {
                rendered
                    .bind_values
                    .iter()
                    .zip(row.iter())
                    .map(|(param, value)| Param::new(param.ty, value.clone()))
                    .collect()
            };

            {
                let mut binder = StatementBinder::new(statement.as_mut(), self.family);
                bind_all(&mut binder, &params)?;
            }
            statement.add()?;
        }

        let results = ResultStreamSubscriber::row_counts(subscription);
        statement.execute().subscribe(results);
        Ok(())
    }
}
