//! The reactive-streams protocol surface.
//!
//! Three roles: a [`Publisher`] is subscribed to by a [`Subscriber`] and hands
//! it a [`Subscription`] for demand and cancellation. Signals may arrive from
//! any thread; implementations in this crate are safe under arbitrary
//! interleaving of upstream and downstream calls.
//!
//! The contract every implementation honors:
//! - `on_subscribe` is delivered exactly once, before any other signal;
//! - at most `sum(request(n))` items are delivered, unless any `n` was
//!   `i64::MAX` (unbounded mode);
//! - `on_error` and `on_complete` are mutually exclusive, each at most once,
//!   and no signal follows either of them or a `cancel`.

use std::sync::Arc;
use std::sync::mpsc;

use crate::error::SqlBridgeError;

/// The demand/cancellation handle owned by one subscriber.
pub trait Subscription: Send + Sync {
    /// Request `n` more items. Non-positive amounts are a protocol violation
    /// and fail the downstream with an invalid-argument error.
    fn request(&self, n: i64);

    /// Stop the stream. The first cancel releases the publisher's resources;
    /// later calls (and later `request` calls) are no-ops.
    fn cancel(&self);
}

/// Receiver of one publisher's signals.
pub trait Subscriber<T>: Send + Sync {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);
    fn on_next(&self, item: T);
    fn on_error(&self, error: SqlBridgeError);
    fn on_complete(&self);
}

/// Source of a demand-driven stream. Single-subscriber: subscribing twice to
/// the same query publisher starts two independent executions.
pub trait Publisher<T>: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

/// A subscriber assembled from closures.
///
/// Used where a full subscriber type would be noise: the fire-and-forget
/// close of a connection, and blocking on a publisher from synchronous code.
pub struct CallbackSubscriber<T> {
    subscribe_fn: Box<dyn Fn(Arc<dyn Subscription>) + Send + Sync>,
    next_fn: Box<dyn Fn(T) + Send + Sync>,
    error_fn: Box<dyn Fn(SqlBridgeError) + Send + Sync>,
    complete_fn: Box<dyn Fn() + Send + Sync>,
}

impl<T> CallbackSubscriber<T> {
    pub fn new(
        subscribe_fn: impl Fn(Arc<dyn Subscription>) + Send + Sync + 'static,
        next_fn: impl Fn(T) + Send + Sync + 'static,
        error_fn: impl Fn(SqlBridgeError) + Send + Sync + 'static,
        complete_fn: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            subscribe_fn: Box::new(subscribe_fn),
            next_fn: Box::new(next_fn),
            error_fn: Box::new(error_fn),
            complete_fn: Box::new(complete_fn),
        }
    }

    /// Requests everything and ignores every signal.
    #[must_use]
    pub fn discarding() -> Self {
        Self::new(|s| s.request(i64::MAX), |_| {}, |_| {}, || {})
    }
}

impl<T> Subscriber<T> for CallbackSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        (self.subscribe_fn)(subscription);
    }

    fn on_next(&self, item: T) {
        (self.next_fn)(item);
    }

    fn on_error(&self, error: SqlBridgeError) {
        (self.error_fn)(error);
    }

    fn on_complete(&self) {
        (self.complete_fn)();
    }
}

enum BlockMessage<T> {
    Item(T),
    Error(SqlBridgeError),
    Complete,
}

/// Block on a publisher's first signal.
///
/// Yields `Ok(Some(item))` for the first item, `Ok(None)` when the publisher
/// completes empty, and a data-access error when the publisher errors or goes
/// away without a terminal signal.
pub fn block_on_publisher<T: Send + 'static>(
    publisher: &dyn Publisher<T>,
) -> Result<Option<T>, SqlBridgeError> {
    let (tx, rx) = mpsc::channel::<BlockMessage<T>>();
    let tx_item = tx.clone();
    let tx_error = tx.clone();
    let tx_complete = tx;

    publisher.subscribe(Arc::new(CallbackSubscriber::new(
        |s| s.request(1),
        move |item| {
            let _ = tx_item.send(BlockMessage::Item(item));
        },
        move |error| {
            let _ = tx_error.send(BlockMessage::Error(error));
        },
        move || {
            let _ = tx_complete.send(BlockMessage::Complete);
        },
    )));

    match rx.recv() {
        Ok(BlockMessage::Item(item)) => Ok(Some(item)),
        Ok(BlockMessage::Error(error)) => Err(SqlBridgeError::data_access(format!(
            "error while blocking on publisher: {error}"
        ))),
        Ok(BlockMessage::Complete) => Ok(None),
        Err(_) => Err(SqlBridgeError::data_access(
            "publisher dropped without a terminal signal",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneShot {
        value: i64,
    }

    struct OneShotSubscription {
        value: i64,
        subscriber: Arc<dyn Subscriber<i64>>,
    }

    impl Subscription for OneShotSubscription {
        fn request(&self, n: i64) {
            if n > 0 {
                self.subscriber.on_next(self.value);
                self.subscriber.on_complete();
            }
        }

        fn cancel(&self) {}
    }

    impl Publisher<i64> for OneShot {
        fn subscribe(&self, subscriber: Arc<dyn Subscriber<i64>>) {
            subscriber.on_subscribe(Arc::new(OneShotSubscription {
                value: self.value,
                subscriber: Arc::clone(&subscriber),
            }));
        }
    }

    struct NoopSubscription;

    impl Subscription for NoopSubscription {
        fn request(&self, _n: i64) {}
        fn cancel(&self) {}
    }

    struct Failing;

    impl Publisher<i64> for Failing {
        fn subscribe(&self, subscriber: Arc<dyn Subscriber<i64>>) {
            subscriber.on_subscribe(Arc::new(NoopSubscription));
            subscriber.on_error(SqlBridgeError::driver("refused"));
        }
    }

    #[test]
    fn block_yields_the_first_item() {
        let got = block_on_publisher(&OneShot { value: 42 }).unwrap();
        assert_eq!(got, Some(42));
    }

    #[test]
    fn block_surfaces_errors_as_data_access() {
        let err = block_on_publisher(&Failing).unwrap_err();
        assert!(matches!(err, SqlBridgeError::DataAccess(_)));
        assert!(err.to_string().contains("refused"));
    }
}
