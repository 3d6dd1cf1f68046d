use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

type Handler = Arc<dyn Fn(&Value) + Send + Sync + 'static>;

/// Token returned by [`EventBus::on`]; the handle used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registered {
    id: u64,
    handler: Handler,
}

/// Process-wide publish/subscribe registry with named topics and ordered,
/// synchronous delivery.
///
/// Delivery order equals registration order, and a handler that panics never
/// prevents the remaining handlers of the same emit from running. Handlers
/// may re-enter the bus (`emit`, `on`, `off`) freely: emission walks a
/// snapshot of the registration list and re-checks each entry's liveness
/// right before invoking it, so handlers removed mid-emit are skipped and
/// handlers added mid-emit run on the next emit only.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    topics: Mutex<HashMap<String, Vec<Registered>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &self,
        topic: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut topics = self.lock_topics();
        topics.entry(topic.to_string()).or_default().push(Registered {
            id,
            handler: Arc::new(handler),
        });
        SubscriptionId(id)
    }

    /// Removes one handler; a no-op when the subscription is already gone.
    pub fn off(&self, topic: &str, subscription: SubscriptionId) {
        let mut topics = self.lock_topics();
        if let Some(handlers) = topics.get_mut(topic) {
            handlers.retain(|registered| registered.id != subscription.0);
            if handlers.is_empty() {
                topics.remove(topic);
            }
        }
    }

    pub fn emit(&self, topic: &str, payload: Value) {
        let snapshot: Vec<(u64, Handler)> = {
            let topics = self.lock_topics();
            match topics.get(topic) {
                Some(handlers) => handlers
                    .iter()
                    .map(|registered| (registered.id, registered.handler.clone()))
                    .collect(),
                None => return,
            }
        };

        for (id, handler) in snapshot {
            if !self.is_registered(topic, id) {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(&payload)));
            if outcome.is_err() {
                tracing::warn!(topic, "event handler panicked; continuing with remaining handlers");
            }
        }
    }

    /// Drops all handlers for one topic, or for every topic when `None`.
    pub fn clear(&self, topic: Option<&str>) {
        let mut topics = self.lock_topics();
        match topic {
            Some(topic) => {
                topics.remove(topic);
            }
            None => topics.clear(),
        }
    }

    pub fn handler_count(&self, topic: &str) -> usize {
        self.lock_topics().get(topic).map_or(0, Vec::len)
    }

    fn is_registered(&self, topic: &str, id: u64) -> bool {
        self.lock_topics()
            .get(topic)
            .is_some_and(|handlers| handlers.iter().any(|registered| registered.id == id))
    }

    fn lock_topics(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Registered>>> {
        self.inner
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
