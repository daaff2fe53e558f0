use std::sync::{Arc, Mutex};

use crate::error::SqlBridgeError;
use crate::exec::result::ResultStreamSubscriber;
use crate::exec::subscription::SubscriptionInner;
use crate::lock_recovered;
use crate::stream::{Subscriber, Subscription};

/// Type-erased view of a forwarder, as the subscription's table stores it.
pub(crate) trait ForwarderHandle: Send + Sync {
    fn upstream(&self) -> Option<Arc<dyn Subscription>>;
}

/// Relays one driver result's row stream into the owning subscription.
///
/// Pacing is strictly one item at a time: a new upstream `request(1)` is
/// issued only after the previous item was delivered downstream, and only
/// while downstream demand lasts. That bounds in-flight items to the number
/// of active forwarders regardless of how aggressively downstream requests.
///
/// The `map` step turns the upstream item into the downstream element;
/// returning `None` suppresses the item (a failed row mapping reports its
/// error through the subscription before returning `None` here).
pub(crate) struct Forwarder<U: Send + 'static, E: Send + 'static> {
    index: u64,
    owner: Arc<ResultStreamSubscriber<E>>,
    upstream: Mutex<Option<Arc<dyn Subscription>>>,
    map: Box<dyn Fn(U) -> Option<E> + Send + Sync>,
}

impl<U: Send + 'static, E: Send + 'static> Forwarder<U, E> {
    /// Create a forwarder under a fresh index and park it in the
    /// subscription's table. Keys are unique and monotonically increasing;
    /// the forwarder removes itself on completion.
    pub(crate) fn register(
        subscription: &Arc<SubscriptionInner<E>>,
        owner: &Arc<ResultStreamSubscriber<E>>,
        map: impl Fn(U) -> Option<E> + Send + Sync + 'static,
    ) -> Arc<Self> {
        let index = subscription.next_forwarder_index();
        let forwarder = Arc::new(Self {
            index,
            owner: Arc::clone(owner),
            upstream: Mutex::new(None),
            map: Box::new(map),
        });
        subscription.insert_forwarder(index, forwarder.clone() as Arc<dyn ForwarderHandle>);
        forwarder
    }
}

impl<U: Send + 'static, E: Send + 'static> Subscriber<U> for Forwarder<U, E> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        *lock_recovered(&self.upstream) = Some(Arc::clone(&subscription));
        if let Some(downstream) = self.owner.subscription() {
            downstream.request1(&subscription);
        }
    }

    fn on_next(&self, item: U) {
        let Some(downstream) = self.owner.subscription() else {
            return;
        };
        if downstream.completed() {
            return;
        }
        if let Some(element) = (self.map)(item) {
            downstream.emit(element);
        }
        let upstream = lock_recovered(&self.upstream).clone();
        if let Some(upstream) = upstream {
            downstream.request1(&upstream);
        }
    }

    fn on_error(&self, error: SqlBridgeError) {
        if let Some(downstream) = self.owner.subscription() {
            downstream.error(error);
        }
    }

    fn on_complete(&self) {
        if let Some(downstream) = self.owner.subscription() {
            downstream.remove_forwarder(self.index);
        }
        self.owner.try_complete();
    }
}

impl<U: Send + 'static, E: Send + 'static> ForwarderHandle for Forwarder<U, E> {
    fn upstream(&self) -> Option<Arc<dyn Subscription>> {
        lock_recovered(&self.upstream).clone()
    }
}
