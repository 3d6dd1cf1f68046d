use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::component::{ComponentKind, PanelComponent, RegionSurface};
use courier_core::error::PanelResult;
use courier_core::events::{self, SearchQueryChanged};
use courier_core::{EventBus, topics};
use courier_gateway::{DataGateway, UserRecord};
use serde_json::Value;

use super::{SubscriptionBag, escape_html};

const RESULTS_SLOT: &str = "results";

struct SearchShared {
    alive: AtomicBool,
    /// Monotonic query counter; a result set only applies if its query is
    /// still the latest one (stale responses are discarded).
    query_seq: AtomicU64,
    region: Mutex<Option<Arc<dyn RegionSurface>>>,
}

impl SearchShared {
    fn new() -> Self {
        Self {
            alive: AtomicBool::new(false),
            query_seq: AtomicU64::new(0),
            region: Mutex::new(None),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn patch_results(&self, markup: &str) {
        if !self.is_alive() {
            return;
        }
        if let Some(region) = self
            .region
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            region.patch(RESULTS_SLOT, markup);
        }
    }
}

fn render_results(users: &[UserRecord]) -> String {
    if users.is_empty() {
        return "<li class=\"notice\">No users found</li>".to_string();
    }
    let mut markup = String::new();
    for user in users {
        markup.push_str(&format!(
            "<li class=\"search-result\" data-user-id=\"{id}\">\
             <span class=\"result-name\">{name}</span>\
             <span class=\"result-username\">@{username}</span></li>",
            id = user.id,
            name = escape_html(&user.name),
            username = escape_html(&user.username),
        ));
    }
    markup
}

/// Transient user-search overlay; result rows lead to profiles or chats via
/// the frontend's own emits.
pub struct Search {
    bus: EventBus,
    gateway: Arc<dyn DataGateway>,
    shared: Arc<SearchShared>,
    subscriptions: Option<SubscriptionBag>,
}

impl Search {
    pub fn new(bus: EventBus, gateway: Arc<dyn DataGateway>) -> Self {
        Self {
            bus,
            gateway,
            shared: Arc::new(SearchShared::new()),
            subscriptions: None,
        }
    }

    fn install_subscriptions(&mut self) {
        let mut bag = SubscriptionBag::new(self.bus.clone());

        let shared = self.shared.clone();
        let gateway = self.gateway.clone();
        bag.add(
            topics::SEARCH_QUERY_CHANGED,
            self.bus.on(topics::SEARCH_QUERY_CHANGED, move |payload| {
                if !shared.is_alive() {
                    return;
                }
                let Some(event) = events::decode::<SearchQueryChanged>(payload) else {
                    return;
                };
                let sequence = shared.query_seq.fetch_add(1, Ordering::SeqCst) + 1;

                let query = event.query.trim().to_string();
                if query.is_empty() {
                    shared.patch_results("<li class=\"notice\">Type to search</li>");
                    return;
                }

                let shared = shared.clone();
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    match gateway.search_users(&query).await {
                        Ok(users) => {
                            // A newer query superseded this one while it was in flight.
                            if shared.query_seq.load(Ordering::SeqCst) != sequence {
                                tracing::debug!(query = %query, "discarding stale search results");
                                return;
                            }
                            shared.patch_results(&render_results(&users));
                        }
                        Err(error) => {
                            tracing::warn!(query = %query, error = %error, "user search failed");
                            shared.patch_results("<li class=\"notice\">Search failed</li>");
                        }
                    }
                });
            }),
        );

        self.subscriptions = Some(bag);
    }
}

#[async_trait]
impl PanelComponent for Search {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Search
    }

    async fn init(
        &mut self,
        region: Arc<dyn RegionSurface>,
        _data: Option<Value>,
    ) -> PanelResult<()> {
        self.shared.alive.store(true, Ordering::SeqCst);
        *self
            .shared
            .region
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(region);

        self.shared.patch_results("<li class=\"notice\">Type to search</li>");
        self.install_subscriptions();
        Ok(())
    }

    fn destroy(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        if let Some(mut bag) = self.subscriptions.take() {
            bag.dispose();
        }
        *self
            .shared
            .region
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}
