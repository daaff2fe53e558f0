//! Legacy blocking execution path.
//!
//! Parallel implementations of the same subscription contract that run
//! synchronously inside the pump instead of chaining driver publishers: a
//! record subscription pulling a cursor, and a row-count subscription
//! executing once. They share no mutable state with the non-blocking engine;
//! pumping is serialized by the cursor mutex because these subscriptions do
//! not participate in the non-blocking demand pump.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

use crate::demand::{Demand, PumpGuard};
use crate::error::SqlBridgeError;
use crate::lock_recovered;
use crate::results::Record;
use crate::stream::{Publisher, Subscriber, Subscription};

/// The synchronous analogue of a row stream, fetched one record at a time.
pub trait RecordCursor: Send {
    /// Fetch the next record; `None` means end of stream.
    ///
    /// # Errors
    ///
    /// A fetch failure terminates the subscription and closes the cursor.
    fn fetch_next(&mut self) -> Result<Option<Record>, SqlBridgeError>;

    /// Release the cursor. Called on every exit path.
    fn close(&mut self);
}

/// A query executed by lazily opening a cursor.
pub trait CursorQuery: Send + Sync {
    /// # Errors
    ///
    /// An open failure terminates the subscription.
    fn open_cursor(&self) -> Result<Box<dyn RecordCursor>, SqlBridgeError>;
}

/// A query executed synchronously for a single row count.
pub trait CountQuery: Send + Sync {
    /// # Errors
    ///
    /// An execution failure terminates the subscription.
    fn execute(&self) -> Result<u64, SqlBridgeError>;
}

/// Publisher over the blocking record path.
pub struct BlockingRecordPublisher {
    query: Arc<dyn CursorQuery>,
}

impl BlockingRecordPublisher {
    #[must_use]
    pub fn new(query: Arc<dyn CursorQuery>) -> Self {
        Self { query }
    }
}

impl Publisher<Record> for BlockingRecordPublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Record>>) {
        let subscription = Arc::new(BlockingRecordSubscription {
            completed: AtomicBool::new(false),
            requested: Demand::new(),
            guard: PumpGuard::new(),
            subscriber: Arc::clone(&subscriber),
            query: Arc::clone(&self.query),
            cursor: Mutex::new(None),
        });
        subscriber.on_subscribe(subscription);
    }
}

struct BlockingRecordSubscription {
    completed: AtomicBool,
    requested: Demand,
    guard: PumpGuard,
    subscriber: Arc<dyn Subscriber<Record>>,
    query: Arc<dyn CursorQuery>,
    cursor: Mutex<Option<Box<dyn RecordCursor>>>,
}

impl BlockingRecordSubscription {
    fn more_requested(&self) -> bool {
        !self.completed.load(Ordering::Acquire) && self.requested.consume_one()
    }

    fn request0(&self) {
        let mut slot = lock_recovered(&self.cursor);

        if !self.completed.load(Ordering::Acquire)
            && let Err(error) = self.drain(&mut slot)
            && !self.completed.swap(true, Ordering::AcqRel)
        {
            self.subscriber.on_error(error);
        }

        // Cursor cleanup on any terminal path, including a cancel that raced
        // a running pump.
        if self.completed.load(Ordering::Acquire)
            && let Some(mut cursor) = slot.take()
        {
            cursor.close();
        }
    }

    fn drain(&self, slot: &mut Option<Box<dyn RecordCursor>>) -> Result<(), SqlBridgeError> {
        if slot.is_none() {
            // Lazy: the cursor opens on the first positive request.
            *slot = Some(self.query.open_cursor()?);
        }
        let Some(cursor) = slot.as_mut() else {
            return Ok(());
        };

        while self.more_requested() {
            match cursor.fetch_next()? {
                Some(record) => self.subscriber.on_next(record),
                None => {
                    if !self.completed.swap(true, Ordering::AcqRel) {
                        self.subscriber.on_complete();
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    /// Close now if no pump owns the cursor; a running pump closes after its
    /// loop instead.
    fn close_cursor_now(&self) {
        let slot = match self.cursor.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        };
        if let Some(mut slot) = slot
            && let Some(mut cursor) = slot.take()
        {
            cursor.close();
        }
    }
}

impl Subscription for BlockingRecordSubscription {
    fn request(&self, n: i64) {
        if n <= 0 {
            if !self.completed.swap(true, Ordering::AcqRel) {
                self.close_cursor_now();
                self.subscriber.on_error(SqlBridgeError::InvalidRequest(n));
            }
        } else if !self.completed.load(Ordering::Acquire) {
            self.requested.add(n);
            self.guard.run(|| self.request0());
        }
    }

    fn cancel(&self) {
        if !self.completed.swap(true, Ordering::AcqRel) {
            self.close_cursor_now();
        }
    }
}

/// Publisher over the blocking row-count path.
pub struct BlockingRowCountPublisher {
    query: Arc<dyn CountQuery>,
}

impl BlockingRowCountPublisher {
    #[must_use]
    pub fn new(query: Arc<dyn CountQuery>) -> Self {
        Self { query }
    }
}

impl Publisher<u64> for BlockingRowCountPublisher {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<u64>>) {
        let subscription = Arc::new(BlockingRowCountSubscription {
            completed: AtomicBool::new(false),
            requested: Demand::new(),
            guard: PumpGuard::new(),
            subscriber: Arc::clone(&subscriber),
            query: Arc::clone(&self.query),
        });
        subscriber.on_subscribe(subscription);
    }
}

struct BlockingRowCountSubscription {
    completed: AtomicBool,
    requested: Demand,
    guard: PumpGuard,
    subscriber: Arc<dyn Subscriber<u64>>,
    query: Arc<dyn CountQuery>,
}

impl BlockingRowCountSubscription {
    fn request0(&self) {
        if self.completed.load(Ordering::Acquire) || !self.requested.consume_one() {
            return;
        }
        match self.query.execute() {
            Ok(count) => {
                self.subscriber.on_next(count);
                if !self.completed.swap(true, Ordering::AcqRel) {
                    self.subscriber.on_complete();
                }
            }
            Err(error) => {
                if !self.completed.swap(true, Ordering::AcqRel) {
                    self.subscriber.on_error(error);
                }
            }
        }
    }
}

impl Subscription for BlockingRowCountSubscription {
    fn request(&self, n: i64) {
        if n <= 0 {
            if !self.completed.swap(true, Ordering::AcqRel) {
                self.subscriber.on_error(SqlBridgeError::InvalidRequest(n));
            }
        } else if !self.completed.load(Ordering::Acquire) {
            self.requested.add(n);
            self.guard.run(|| self.request0());
        }
    }

    fn cancel(&self) {
        self.completed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::RecordSchema;

    struct CountingCursor {
        remaining: u32,
        schema: Arc<RecordSchema>,
        closed: Arc<AtomicBool>,
    }

    impl RecordCursor for CountingCursor {
        fn fetch_next(&mut self) -> Result<Option<Record>, SqlBridgeError> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(Record::empty(Arc::clone(&self.schema))))
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::Release);
        }
    }

    struct CountingQuery {
        rows: u32,
        closed: Arc<AtomicBool>,
    }

    impl CursorQuery for CountingQuery {
        fn open_cursor(&self) -> Result<Box<dyn RecordCursor>, SqlBridgeError> {
            Ok(Box::new(CountingCursor {
                remaining: self.rows,
                schema: RecordSchema::new(vec!["n".to_string()]),
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    struct Collecting {
        items: Mutex<Vec<Record>>,
        completed: AtomicBool,
        subscription: Mutex<Option<Arc<dyn Subscription>>>,
    }

    impl Collecting {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                items: Mutex::new(Vec::new()),
                completed: AtomicBool::new(false),
                subscription: Mutex::new(None),
            })
        }
    }

    impl Subscriber<Record> for Collecting {
        fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
            *lock_recovered(&self.subscription) = Some(subscription);
        }

        fn on_next(&self, item: Record) {
            lock_recovered(&self.items).push(item);
        }

        fn on_error(&self, _error: SqlBridgeError) {}

        fn on_complete(&self) {
            self.completed.store(true, Ordering::Release);
        }
    }

    #[test]
    fn cursor_closes_on_end_of_stream() {
        let closed = Arc::new(AtomicBool::new(false));
        let publisher = BlockingRecordPublisher::new(Arc::new(CountingQuery {
            rows: 3,
            closed: Arc::clone(&closed),
        }));

        let subscriber = Collecting::new();
        publisher.subscribe(subscriber.clone());
        let subscription = lock_recovered(&subscriber.subscription)
            .clone()
            .unwrap();

        subscription.request(i64::MAX);
        assert_eq!(lock_recovered(&subscriber.items).len(), 3);
        assert!(subscriber.completed.load(Ordering::Acquire));
        assert!(closed.load(Ordering::Acquire));
    }

    #[test]
    fn cancel_closes_the_cursor_without_completion() {
        let closed = Arc::new(AtomicBool::new(false));
        let publisher = BlockingRecordPublisher::new(Arc::new(CountingQuery {
            rows: 5,
            closed: Arc::clone(&closed),
        }));

        let subscriber = Collecting::new();
        publisher.subscribe(subscriber.clone());
        let subscription = lock_recovered(&subscriber.subscription)
            .clone()
            .unwrap();

        subscription.request(2);
        subscription.cancel();

        assert_eq!(lock_recovered(&subscriber.items).len(), 2);
        assert!(!subscriber.completed.load(Ordering::Acquire));
        assert!(closed.load(Ordering::Acquire));

        // Post-terminal requests are no-ops.
        subscription.request(10);
        assert_eq!(lock_recovered(&subscriber.items).len(), 2);
    }
}
