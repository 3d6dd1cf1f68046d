use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier_core::component::{ComponentKind, PanelComponent, RegionSurface};
use courier_core::error::{PanelError, PanelResult};
use courier_core::events::{
    self, ChatCreated, MessageReceived, MessageSent, SendMessageRequested, WsMessageDeleted,
    WsMessageEdited,
};
use courier_core::{EventBus, topics};
use courier_gateway::{ChatId, ChatKind, ChatSummary, DataGateway, Message, NewChat, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{SubscriptionBag, escape_html, format_time};

const MESSAGE_PAGE_SIZE: usize = 50;
const HEADER_SLOT: &str = "header";
const MESSAGES_SLOT: &str = "messages";

/// Load payload for the chat panel: either an existing chat or a draft
/// conversation with a user no chat exists for yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPanelData {
    #[serde(default)]
    pub chat: Option<ChatSummary>,
    #[serde(default)]
    pub draft: Option<DraftChat>,
}

/// Conversation that has no persisted chat yet; promoted on first send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftChat {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

enum ChatTarget {
    Existing(ChatSummary),
    Draft(DraftChat),
}

impl ChatTarget {
    fn chat_id(&self) -> Option<ChatId> {
        match self {
            Self::Existing(chat) => Some(chat.id),
            Self::Draft(_) => None,
        }
    }

    fn title(&self) -> &str {
        match self {
            Self::Existing(chat) => &chat.name,
            Self::Draft(draft) => &draft.name,
        }
    }
}

struct ChatShared {
    alive: AtomicBool,
    is_sending: AtomicBool,
    local_user_id: UserId,
    region: Mutex<Option<Arc<dyn RegionSurface>>>,
    state: Mutex<ChatViewState>,
}

#[derive(Default)]
struct ChatViewState {
    target: Option<ChatTarget>,
    messages: Vec<Message>,
}

impl ChatShared {
    fn new(local_user_id: UserId) -> Self {
        Self {
            alive: AtomicBool::new(false),
            is_sending: AtomicBool::new(false),
            local_user_id,
            region: Mutex::new(None),
            state: Mutex::new(ChatViewState::default()),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn current_chat_id(&self) -> Option<ChatId> {
        self.lock_state().target.as_ref().and_then(ChatTarget::chat_id)
    }

    fn append_message(&self, message: Message) -> bool {
        let mut state = self.lock_state();
        if state.messages.iter().any(|existing| existing.id == message.id) {
            return false;
        }
        state.messages.push(message);
        true
    }

    fn render(&self) {
        if !self.is_alive() {
            return;
        }
        let (header, thread) = {
            let state = self.lock_state();
            let Some(target) = state.target.as_ref() else {
                return;
            };
            (
                render_header(target),
                render_thread(&state.messages, self.local_user_id),
            )
        };
        if let Some(region) = self.lock_region().as_ref() {
            region.patch(HEADER_SLOT, &header);
            region.patch(MESSAGES_SLOT, &thread);
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ChatViewState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_region(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn RegionSurface>>> {
        self.region.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn render_header(target: &ChatTarget) -> String {
    format!(
        "<h2 class=\"chat-title\">{}</h2>",
        escape_html(target.title())
    )
}

fn render_thread(messages: &[Message], local_user_id: UserId) -> String {
    if messages.is_empty() {
        return "<p class=\"notice\">No messages yet</p>".to_string();
    }

    let mut markup = String::new();
    for message in messages {
        let direction = if message.sender_id == local_user_id {
            "outgoing"
        } else {
            "incoming"
        };
        let edited = if message.is_edited {
            "<span class=\"edited-marker\">edited</span>"
        } else {
            ""
        };
        markup.push_str(&format!(
            "<div class=\"message {direction}\" data-message-id=\"{id}\">\
             <span class=\"message-text\">{text}</span>\
             <span class=\"message-time\">{time}</span>{edited}</div>",
            id = message.id,
            text = escape_html(&message.text),
            time = format_time(&message.sent_at),
        ));
    }
    markup
}

/// Secondary-region chat thread: renders the open conversation, patches
/// itself in place on live events, and owns the guarded send flow.
pub struct ChatView {
    bus: EventBus,
    gateway: Arc<dyn DataGateway>,
    shared: Arc<ChatShared>,
    subscriptions: Option<SubscriptionBag>,
}

impl ChatView {
    pub fn new(bus: EventBus, gateway: Arc<dyn DataGateway>, local_user_id: UserId) -> Self {
        Self {
            bus,
            gateway,
            shared: Arc::new(ChatShared::new(local_user_id)),
            subscriptions: None,
        }
    }

    fn install_subscriptions(&mut self) {
        let mut bag = SubscriptionBag::new(self.bus.clone());

        // Active-chat fast path: a routed inbound message lands in place.
        {
            let shared = self.shared.clone();
            bag.add(
                topics::MESSAGE_RECEIVED,
                self.bus.on(topics::MESSAGE_RECEIVED, move |payload| {
                    if !shared.is_alive() {
                        return;
                    }
                    let Some(event) = events::decode::<MessageReceived>(payload) else {
                        return;
                    };
                    if !event.is_active_chat || shared.current_chat_id() != Some(event.chat_id) {
                        return;
                    }
                    if shared.append_message(event.message) {
                        shared.render();
                    }
                }),
            );
        }

        {
            let shared = self.shared.clone();
            bag.add(
                topics::WEBSOCKET_MESSAGE_EDITED,
                self.bus.on(topics::WEBSOCKET_MESSAGE_EDITED, move |payload| {
                    if !shared.is_alive() {
                        return;
                    }
                    let Some(event) = events::decode::<WsMessageEdited>(payload) else {
                        return;
                    };
                    if shared.current_chat_id() != Some(event.chat_id) {
                        return;
                    }
                    {
                        let mut state = shared.lock_state();
                        let Some(message) = state
                            .messages
                            .iter_mut()
                            .find(|message| message.id == event.message_id)
                        else {
                            return;
                        };
                        message.text = event.new_text;
                        message.is_edited = true;
                        message.edited_at = event.edited_at;
                    }
                    shared.render();
                }),
            );
        }

        {
            let shared = self.shared.clone();
            bag.add(
                topics::WEBSOCKET_MESSAGE_DELETED,
                self.bus.on(topics::WEBSOCKET_MESSAGE_DELETED, move |payload| {
                    if !shared.is_alive() {
                        return;
                    }
                    let Some(event) = events::decode::<WsMessageDeleted>(payload) else {
                        return;
                    };
                    if shared.current_chat_id() != Some(event.chat_id) {
                        return;
                    }
                    shared
                        .lock_state()
                        .messages
                        .retain(|message| message.id != event.message_id);
                    shared.render();
                }),
            );
        }

        {
            let shared = self.shared.clone();
            let gateway = self.gateway.clone();
            let bus = self.bus.clone();
            bag.add(
                topics::SEND_MESSAGE_REQUESTED,
                self.bus.on(topics::SEND_MESSAGE_REQUESTED, move |payload| {
                    if !shared.is_alive() {
                        return;
                    }
                    let Some(event) = events::decode::<SendMessageRequested>(payload) else {
                        return;
                    };
                    Self::start_send(shared.clone(), gateway.clone(), bus.clone(), event.text);
                }),
            );
        }

        self.subscriptions = Some(bag);
    }

    /// Guarded send flow: one in-flight send at a time, draft promotion on
    /// first send, optimistic local append, then a `message-sent` emit.
    fn start_send(
        shared: Arc<ChatShared>,
        gateway: Arc<dyn DataGateway>,
        bus: EventBus,
        text: String,
    ) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        if shared.is_sending.swap(true, Ordering::SeqCst) {
            tracing::debug!("message send already in progress, skipping");
            return;
        }

        tokio::spawn(async move {
            let outcome = Self::run_send(&shared, &gateway, &bus, &text).await;
            if let Err(error) = outcome {
                tracing::warn!(error = %error, "failed to send message");
                if shared.is_alive()
                    && let Some(region) = shared.lock_region().as_ref()
                {
                    region.patch(
                        "notice",
                        "<span class=\"send-error\">Could not send the message</span>",
                    );
                }
            }
            shared.is_sending.store(false, Ordering::SeqCst);
        });
    }

    async fn run_send(
        shared: &Arc<ChatShared>,
        gateway: &Arc<dyn DataGateway>,
        bus: &EventBus,
        text: &str,
    ) -> Result<(), courier_gateway::GatewayError> {
        // A draft conversation becomes a persisted chat on first send.
        let chat_id = match shared.current_chat_id() {
            Some(chat_id) => chat_id,
            None => {
                let draft = {
                    let state = shared.lock_state();
                    match state.target.as_ref() {
                        Some(ChatTarget::Draft(draft)) => draft.clone(),
                        _ => return Ok(()),
                    }
                };
                let chat = gateway
                    .create_chat(NewChat {
                        peer_id: draft.user_id,
                        kind: ChatKind::Private,
                        name: draft.name.clone(),
                        avatar_url: draft.avatar_url.clone(),
                    })
                    .await?;
                if !shared.is_alive() {
                    return Ok(());
                }
                let chat_id = chat.id;
                shared.lock_state().target = Some(ChatTarget::Existing(chat.clone()));
                bus.emit(topics::CHAT_CREATED, events::encode(&ChatCreated { chat }));
                chat_id
            }
        };

        let message = gateway.send_message(chat_id, text).await?;
        // The user may have navigated away while the send was in flight.
        if !shared.is_alive() || shared.current_chat_id() != Some(chat_id) {
            tracing::debug!(chat_id = %chat_id, "discarding stale send result");
            return Ok(());
        }

        if shared.append_message(message.clone()) {
            shared.render();
        }
        bus.emit(
            topics::MESSAGE_SENT,
            events::encode(&MessageSent { chat_id, message }),
        );
        Ok(())
    }

    fn decode_target(data: Option<Value>) -> Option<ChatTarget> {
        let data = data?;
        let panel_data: ChatPanelData = events::decode(&data)?;
        if let Some(chat) = panel_data.chat {
            return Some(ChatTarget::Existing(chat));
        }
        panel_data.draft.map(ChatTarget::Draft)
    }
}

#[async_trait]
impl PanelComponent for ChatView {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Chat
    }

    async fn init(
        &mut self,
        region: Arc<dyn RegionSurface>,
        data: Option<Value>,
    ) -> PanelResult<()> {
        let target = Self::decode_target(data).ok_or_else(|| {
            PanelError::component_init(ComponentKind::Chat, "missing or malformed chat payload")
        })?;

        self.shared.alive.store(true, Ordering::SeqCst);
        *self.shared.lock_region() = Some(region.clone());

        let chat_id = target.chat_id();
        self.shared.lock_state().target = Some(target);

        if let Some(chat_id) = chat_id {
            // Opening a chat clears its unread state; best-effort.
            if let Err(error) = self.gateway.mark_chat_as_read(chat_id).await {
                tracing::warn!(chat_id = %chat_id, error = %error, "failed to mark chat as read");
            }
            match self.gateway.get_messages(chat_id, 0, MESSAGE_PAGE_SIZE).await {
                Ok(messages) => {
                    self.shared.lock_state().messages = messages;
                }
                Err(error) => {
                    tracing::warn!(chat_id = %chat_id, error = %error, "failed to load messages");
                    region.patch(
                        MESSAGES_SLOT,
                        "<p class=\"notice\">Failed to load messages</p>",
                    );
                }
            }
        }

        self.shared.render();
        self.install_subscriptions();
        Ok(())
    }

    fn destroy(&mut self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        if let Some(mut bag) = self.subscriptions.take() {
            bag.dispose();
        }
        *self.shared.lock_region() = None;
    }

    async fn refresh(&mut self) -> PanelResult<()> {
        let Some(chat_id) = self.shared.current_chat_id() else {
            return Ok(());
        };
        match self.gateway.get_messages(chat_id, 0, MESSAGE_PAGE_SIZE).await {
            Ok(messages) => {
                self.shared.lock_state().messages = messages;
                self.shared.render();
            }
            Err(error) => {
                tracing::warn!(chat_id = %chat_id, error = %error, "chat refresh failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courier_gateway::{MessageId, MessageKind};

    fn message(id: i64, sender: i64) -> Message {
        Message {
            id: MessageId::new(id),
            chat_id: ChatId::new(1),
            sender_id: UserId::new(sender),
            sender_name: None,
            text: format!("message {id}"),
            sent_at: Utc::now(),
            kind: MessageKind::Text,
            is_read: false,
            is_edited: false,
            edited_at: None,
        }
    }

    #[test]
    fn append_deduplicates_by_message_id() {
        let shared = ChatShared::new(UserId::new(1));
        assert!(shared.append_message(message(5, 2)));
        assert!(!shared.append_message(message(5, 2)));
        assert_eq!(shared.lock_state().messages.len(), 1);
    }

    #[test]
    fn thread_markup_distinguishes_message_direction() {
        let markup = render_thread(&[message(1, 1), message(2, 2)], UserId::new(1));
        assert!(markup.contains("message outgoing"));
        assert!(markup.contains("message incoming"));
    }

    #[test]
    fn chat_selected_payload_decodes_as_existing_target() {
        let chat = ChatSummary {
            id: ChatId::new(4),
            peer_id: UserId::new(2),
            kind: ChatKind::Private,
            name: "Anna".to_string(),
            avatar_url: None,
            last_message: None,
            unread_count: 0,
            is_pinned: false,
            is_muted: false,
        };
        let payload = events::encode(&events::ChatSelected { chat });
        let target = ChatView::decode_target(Some(payload)).unwrap();
        assert_eq!(target.chat_id(), Some(ChatId::new(4)));
    }

    #[test]
    fn draft_payload_decodes_without_a_chat_id() {
        let payload = serde_json::json!({
            "draft": { "userId": 9, "name": "New person" }
        });
        let target = ChatView::decode_target(Some(payload)).unwrap();
        assert_eq!(target.chat_id(), None);
        assert_eq!(target.title(), "New person");
    }
}
