use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::component::{ComponentKind, PanelComponent, RegionSurface};
use courier_core::error::PanelResult;
use courier_core::events::{
    self, ChatActionRequested, ChatCreated, ChatDeleted, MessageReceived, MessageSent,
};
use courier_core::{DirectorySubscription, EventBus, UserDirectory, topics};
use courier_gateway::{ChatId, ChatSummary, DataGateway, LastMessage, Message, UserId};
use serde_json::Value;

use super::{SubscriptionBag, escape_html, format_time};

const CHAT_PAGE_SIZE: usize = 50;
const CHATS_SLOT: &str = "chats";

/// Pure list state; ordering is pinned-first, then recency.
#[derive(Default)]
pub struct ChatsListState {
    chats: Vec<ChatSummary>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Updated,
    /// The chat is not in the list; the caller refreshes instead.
    Missing,
}

impl ChatsListState {
    pub fn set_chats(&mut self, chats: Vec<ChatSummary>) {
        self.chats = chats;
        self.sort_pinned_first();
    }

    pub fn chats(&self) -> &[ChatSummary] {
        &self.chats
    }

    pub fn contains(&self, chat_id: ChatId) -> bool {
        self.chats.iter().any(|chat| chat.id == chat_id)
    }

    /// Updates one chat's summary row for a new message and reorders it to
    /// the top of the unpinned band. Pinned chats never move, and nothing
    /// ever moves above a pinned chat.
    pub fn apply_message(&mut self, chat_id: ChatId, message: &Message) -> ApplyOutcome {
        let Some(index) = self.chats.iter().position(|chat| chat.id == chat_id) else {
            return ApplyOutcome::Missing;
        };

        self.chats[index].last_message = Some(LastMessage {
            text: message.text.clone(),
            time: message.sent_at,
            sender_id: message.sender_id,
            is_read: true,
        });

        if !self.chats[index].is_pinned {
            let first_unpinned = self
                .chats
                .iter()
                .position(|chat| !chat.is_pinned)
                .unwrap_or(self.chats.len());
            if index > first_unpinned {
                let chat = self.chats.remove(index);
                self.chats.insert(first_unpinned, chat);
            }
        }
        ApplyOutcome::Updated
    }

    /// Replaces a chat row in place (pin/mute toggles return the full row).
    pub fn replace(&mut self, chat: ChatSummary) {
        if let Some(existing) = self.chats.iter_mut().find(|existing| existing.id == chat.id) {
            *existing = chat;
        } else {
            self.chats.push(chat);
        }
    }

    pub fn upsert(&mut self, chat: ChatSummary) {
        self.replace(chat);
        self.sort_pinned_first();
    }

    pub fn remove(&mut self, chat_id: ChatId) {
        self.chats.retain(|chat| chat.id != chat_id);
    }

    pub fn sort_pinned_first(&mut self) {
        self.chats.sort_by_key(|chat| !chat.is_pinned);
    }
}

struct ListShared {
    alive: AtomicBool,
    region: Mutex<Option<Arc<dyn RegionSurface>>>,
    state: Mutex<ChatsListState>,
}

impl ListShared {
    fn new() -> Self {
        Self {
            alive: AtomicBool::new(false),
            region: Mutex::new(None),
            state: Mutex::new(ChatsListState::default()),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn render(&self, directory: &UserDirectory) {
        if !self.is_alive() {
            return;
        }
        let markup = {
            let state = self.lock_state();
            render_rows(state.chats(), directory)
        };
        if let Some(region) = self.lock_region().as_ref() {
            region.patch(CHATS_SLOT, &markup);
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ChatsListState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_region(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn RegionSurface>>> {
        self.region.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn render_rows(chats: &[ChatSummary], directory: &UserDirectory) -> String {
    if chats.is_empty() {
        return "<li class=\"notice\">No chats yet</li>".to_string();
    }

    let mut markup = String::new();
    for chat in chats {
        let online = directory.get_status(chat.peer_id);
        let mut classes = String::from("chat-item");
        if chat.is_pinned {
            classes.push_str(" pinned");
        }
        if chat.is_muted {
            classes.push_str(" muted");
        }

        let last = chat
            .last_message
            .as_ref()
            .map(|last| {
                format!(
                    "<span class=\"chat-last\">{}</span><span class=\"chat-time\">{}</span>",
                    escape_html(&last.text),
                    format_time(&last.time)
                )
            })
            .unwrap_or_default();
        let unread = if chat.unread_count > 0 {
            format!("<span class=\"unread-badge\">{}</span>", chat.unread_count)
        } else {
            String::new()
        };

        markup.push_str(&format!(
            "<li class=\"{classes}\" data-chat-id=\"{id}\">\
             <span class=\"status-dot{online}\"></span>\
             <span class=\"chat-name\">{name}</span>{last}{unread}</li>",
            id = chat.id,
            online = if online { " online" } else { "" },
            name = escape_html(&chat.name),
        ));
    }
    markup
}

/// Primary-region chat list: loads summaries, keeps single rows fresh from
/// bus events without refetching, and services row-level pin/mute/delete
/// intents.
pub struct ChatsList {
    bus: EventBus,
    gateway: Arc<dyn DataGateway>,
    directory: Arc<UserDirectory>,
    shared: Arc<ListShared>,
    subscriptions: Option<SubscriptionBag>,
    directory_subscription: Option<DirectorySubscription>,
}

impl ChatsList {
    pub fn new(bus: EventBus, gateway: Arc<dyn DataGateway>, directory: Arc<UserDirectory>) -> Self {
        Self {
            bus,
            gateway,
            directory,
            shared: Arc::new(ListShared::new()),
            subscriptions: None,
            directory_subscription: None,
        }
    }

    fn apply_or_refresh(
        shared: &Arc<ListShared>,
        gateway: &Arc<dyn DataGateway>,
        directory: &Arc<UserDirectory>,
        chat_id: ChatId,
        message: &Message,
    ) {
        let outcome = shared.lock_state().apply_message(chat_id, message);
        match outcome {
            ApplyOutcome::Updated => shared.render(directory),
            ApplyOutcome::Missing => {
                tracing::debug!(chat_id = %chat_id, "chat missing from list, refreshing");
                Self::spawn_refresh(shared.clone(), gateway.clone(), directory.clone());
            }
        }
    }

    fn spawn_refresh(
        shared: Arc<ListShared>,
        gateway: Arc<dyn DataGateway>,
        directory: Arc<UserDirectory>,
    ) {
        tokio::spawn(async move {
            match gateway.get_chats(0, CHAT_PAGE_SIZE).await {
                Ok(chats) => {
                    // The component may have been destroyed while we were away.
                    if !shared.is_alive() {
                        return;
                    }
                    let peer_ids: Vec<UserId> = chats.iter().map(|chat| chat.peer_id).collect();
                    directory.load_users(&peer_ids).await;
                    if !shared.is_alive() {
                        return;
                    }
                    shared.lock_state().set_chats(chats);
                    shared.render(&directory);
                }
                Err(error) => {
                    tracing::warn!(error = %error, "chat list refresh failed");
                }
            }
        });
    }

    fn install_subscriptions(&mut self) {
        let mut bag = SubscriptionBag::new(self.bus.clone());

        {
            let shared = self.shared.clone();
            let gateway = self.gateway.clone();
            let directory = self.directory.clone();
            bag.add(
                topics::MESSAGE_RECEIVED,
                self.bus.on(topics::MESSAGE_RECEIVED, move |payload| {
                    if !shared.is_alive() {
                        return;
                    }
                    if let Some(event) = events::decode::<MessageReceived>(payload) {
                        Self::apply_or_refresh(
                            &shared,
                            &gateway,
                            &directory,
                            event.chat_id,
                            &event.message,
                        );
                    }
                }),
            );
        }

        {
            let shared = self.shared.clone();
            let gateway = self.gateway.clone();
            let directory = self.directory.clone();
            bag.add(
                topics::MESSAGE_SENT,
                self.bus.on(topics::MESSAGE_SENT, move |payload| {
                    if !shared.is_alive() {
                        return;
                    }
                    if let Some(event) = events::decode::<MessageSent>(payload) {
                        Self::apply_or_refresh(
                            &shared,
                            &gateway,
                            &directory,
                            event.chat_id,
                            &event.message,
                        );
                    }
                }),
            );
        }

        {
            let shared = self.shared.clone();
            let directory = self.directory.clone();
            bag.add(
                topics::CHAT_CREATED,
                self.bus.on(topics::CHAT_CREATED, move |payload| {
                    if let Some(event) = events::decode::<ChatCreated>(payload) {
                        shared.lock_state().upsert(event.chat);
                        shared.render(&directory);
                    }
                }),
            );
        }

        {
            let shared = self.shared.clone();
            let directory = self.directory.clone();
            bag.add(
                topics::CHAT_DELETED,
                self.bus.on(topics::CHAT_DELETED, move |payload| {
                    if let Some(event) = events::decode::<ChatDeleted>(payload) {
                        shared.lock_state().remove(event.chat_id);
                        shared.render(&directory);
                    }
                }),
            );
        }

        {
            let shared = self.shared.clone();
            let gateway = self.gateway.clone();
            let directory = self.directory.clone();
            bag.add(
                topics::CHAT_PIN_REQUESTED,
                self.bus.on(topics::CHAT_PIN_REQUESTED, move |payload| {
                    let Some(event) = events::decode::<ChatActionRequested>(payload) else {
                        return;
                    };
                    let shared = shared.clone();
                    let gateway = gateway.clone();
                    let directory = directory.clone();
                    tokio::spawn(async move {
                        match gateway.toggle_chat_pin(event.chat_id).await {
                            Ok(chat) if shared.is_alive() => {
                                let mut state = shared.lock_state();
                                state.replace(chat);
                                state.sort_pinned_first();
                                drop(state);
                                shared.render(&directory);
                            }
                            Ok(_) => {}
                            Err(error) => {
                                tracing::warn!(chat_id = %event.chat_id, error = %error, "pin toggle failed");
                            }
                        }
                    });
                }),
            );
        }

        {
            let shared = self.shared.clone();
            let gateway = self.gateway.clone();
            let directory = self.directory.clone();
            bag.add(
                topics::CHAT_MUTE_REQUESTED,
                self.bus.on(topics::CHAT_MUTE_REQUESTED, move |payload| {
                    let Some(event) = events::decode::<ChatActionRequested>(payload) else {
                        return;
                    };
                    let shared = shared.clone();
                    let gateway = gateway.clone();
                    let directory = directory.clone();
                    tokio::spawn(async move {
                        match gateway.toggle_chat_mute(event.chat_id).await {
                            Ok(chat) if shared.is_alive() => {
                                shared.lock_state().replace(chat);
                                shared.render(&directory);
                            }
                            Ok(_) => {}
                            Err(error) => {
                                tracing::warn!(chat_id = %event.chat_id, error = %error, "mute toggle failed");
                            }
                        }
                    });
                }),
            );
        }

        {
            let gateway = self.gateway.clone();
            let bus = self.bus.clone();
            bag.add(
                topics::CHAT_DELETE_REQUESTED,
                self.bus.on(topics::CHAT_DELETE_REQUESTED, move |payload| {
                    let Some(event) = events::decode::<ChatActionRequested>(payload) else {
                        return;
                    };
                    let gateway = gateway.clone();
                    let bus = bus.clone();
                    tokio::spawn(async move {
                        match gateway.delete_chat(event.chat_id).await {
                            Ok(()) => {
                                bus.emit(
                                    topics::CHAT_DELETED,
                                    events::encode(&ChatDeleted {
                                        chat_id: event.chat_id,
                                    }),
                                );
                            }
                            Err(error) => {
                                tracing::warn!(chat_id = %event.chat_id, error = %error, "chat delete failed");
                            }
                        }
                    });
                }),
            );
        }

        self.subscriptions = Some(bag);

        let shared = self.shared.clone();
        let directory = self.directory.clone();
        self.directory_subscription = Some(self.directory.subscribe(move |_event, _data| {
            // Online dots re-render from cached state; no refetch.
            shared.render(&directory);
        }));
    }
}

#[async_trait]
impl PanelComponent for ChatsList {
    fn kind(&self) -> ComponentKind {
        ComponentKind::ChatsList
    }

    async fn init(
        &mut self,
        region: Arc<dyn RegionSurface>,
        _data: Option<Value>,
    ) -> PanelResult<()> {
        self.shared.alive.store(true, Ordering::SeqCst);
        *self.shared.lock_region() = Some(region.clone());

        match self.gateway.get_chats(0, CHAT_PAGE_SIZE).await {
            Ok(chats) => {
                let peer_ids: Vec<UserId> = chats.iter().map(|chat| chat.peer_id).collect();
                self.directory.load_users(&peer_ids).await;
                self.shared.lock_state().set_chats(chats);
                self.shared.render(&self.directory);
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to load chats");
                region.patch(CHATS_SLOT, "<li class=\"notice\">Failed to load chats</li>");
            }
        }

        self.install_subscriptions();
        Ok(())
    }

    fn destroy(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        if let Some(mut bag) = self.subscriptions.take() {
            bag.dispose();
        }
        if let Some(subscription) = self.directory_subscription.take() {
            subscription.dispose();
        }
        *self.shared.lock_region() = None;
    }

    async fn refresh(&mut self) -> PanelResult<()> {
        match self.gateway.get_chats(0, CHAT_PAGE_SIZE).await {
            Ok(chats) => {
                let peer_ids: Vec<UserId> = chats.iter().map(|chat| chat.peer_id).collect();
                self.directory.load_users(&peer_ids).await;
                self.shared.lock_state().set_chats(chats);
                self.shared.render(&self.directory);
            }
            Err(error) => {
                tracing::warn!(error = %error, "chat list refresh failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_gateway::{ChatKind, MessageId, MessageKind};

    fn chat(id: i64, pinned: bool) -> ChatSummary {
        ChatSummary {
            id: ChatId::new(id),
            peer_id: UserId::new(id + 10),
            kind: ChatKind::Private,
            name: format!("chat-{id}"),
            avatar_url: None,
            last_message: None,
            unread_count: 0,
            is_pinned: pinned,
            is_muted: false,
        }
    }

    fn message(chat_id: i64) -> Message {
        Message {
            id: MessageId::new(99),
            chat_id: ChatId::new(chat_id),
            sender_id: UserId::new(chat_id + 10),
            sender_name: None,
            text: "new arrival".to_string(),
            sent_at: Utc::now(),
            kind: MessageKind::Text,
            is_read: false,
            is_edited: false,
            edited_at: None,
        }
    }

    fn ids(state: &ChatsListState) -> Vec<i64> {
        state.chats().iter().map(|chat| chat.id.value()).collect()
    }

    #[test]
    fn new_message_lifts_unpinned_chat_to_top_of_unpinned_band() {
        let mut state = ChatsListState::default();
        state.set_chats(vec![chat(1, true), chat(2, false), chat(3, false)]);

        let outcome = state.apply_message(ChatId::new(3), &message(3));
        assert_eq!(outcome, ApplyOutcome::Updated);
        assert_eq!(ids(&state), vec![1, 3, 2]);
    }

    #[test]
    fn pinned_chat_never_moves_on_new_messages() {
        let mut state = ChatsListState::default();
        state.set_chats(vec![chat(1, true), chat(2, false), chat(3, false)]);

        state.apply_message(ChatId::new(1), &message(1));
        assert_eq!(ids(&state), vec![1, 2, 3]);
        let first = &state.chats()[0];
        assert_eq!(first.last_message.as_ref().unwrap().text, "new arrival");
    }

    #[test]
    fn chat_already_on_top_of_unpinned_band_stays_put() {
        let mut state = ChatsListState::default();
        state.set_chats(vec![chat(1, true), chat(2, false), chat(3, false)]);

        state.apply_message(ChatId::new(2), &message(2));
        assert_eq!(ids(&state), vec![1, 2, 3]);
    }

    #[test]
    fn unknown_chat_reports_missing() {
        let mut state = ChatsListState::default();
        state.set_chats(vec![chat(1, false)]);
        assert_eq!(
            state.apply_message(ChatId::new(42), &message(42)),
            ApplyOutcome::Missing
        );
    }

    #[test]
    fn upsert_keeps_pinned_chats_in_front() {
        let mut state = ChatsListState::default();
        state.set_chats(vec![chat(2, false), chat(1, true)]);
        assert_eq!(ids(&state), vec![1, 2]);

        state.upsert(chat(5, true));
        assert_eq!(ids(&state), vec![1, 5, 2]);

        state.remove(ChatId::new(5));
        assert_eq!(ids(&state), vec![1, 2]);
    }
}
