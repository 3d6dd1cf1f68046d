use std::sync::{Arc, Mutex};

use courier_core::events::{self, ChatCreated, ChatDeleted, ChatSelected, MessageReceived, WsNewMessage};
use courier_core::{EventBus, SubscriptionId, topics};
use courier_gateway::{ChatId, DataGateway, UserId};

/// Routes inbound live messages to the rest of the app.
///
/// Tracks which chat is open in the secondary region, suppresses self-echoes
/// (messages this client authored arrive back over the wire but were already
/// applied optimistically), and fans one inbound message out as a single
/// `message-received` event both regions consume. Messages landing in the
/// active chat are also marked read, best-effort.
pub struct MessageRouter {
    bus: EventBus,
    subscriptions: Vec<(&'static str, SubscriptionId)>,
}

impl MessageRouter {
    pub fn install(
        bus: EventBus,
        gateway: Arc<dyn DataGateway>,
        local_user_id: UserId,
    ) -> Self {
        let active_chat: Arc<Mutex<Option<ChatId>>> = Arc::new(Mutex::new(None));
        let mut subscriptions = Vec::new();

        {
            let active_chat = active_chat.clone();
            subscriptions.push((
                topics::CHAT_SELECTED,
                bus.on(topics::CHAT_SELECTED, move |payload| {
                    if let Some(event) = events::decode::<ChatSelected>(payload) {
                        tracing::debug!(chat_id = %event.chat.id, "active chat changed");
                        *lock(&active_chat) = Some(event.chat.id);
                    }
                }),
            ));
        }

        {
            // A draft promoted to a real chat becomes the active one.
            let active_chat = active_chat.clone();
            subscriptions.push((
                topics::CHAT_CREATED,
                bus.on(topics::CHAT_CREATED, move |payload| {
                    if let Some(event) = events::decode::<ChatCreated>(payload) {
                        *lock(&active_chat) = Some(event.chat.id);
                    }
                }),
            ));
        }

        {
            let active_chat = active_chat.clone();
            subscriptions.push((
                topics::CHAT_DELETED,
                bus.on(topics::CHAT_DELETED, move |payload| {
                    if let Some(event) = events::decode::<ChatDeleted>(payload) {
                        let mut active = lock(&active_chat);
                        if *active == Some(event.chat_id) {
                            *active = None;
                        }
                    }
                }),
            ));
        }

        {
            let active_chat = active_chat.clone();
            let emit_bus = bus.clone();
            subscriptions.push((
                topics::WEBSOCKET_NEW_MESSAGE,
                bus.on(topics::WEBSOCKET_NEW_MESSAGE, move |payload| {
                    let Some(event) = events::decode::<WsNewMessage>(payload) else {
                        return;
                    };

                    if event.message.sender_id == local_user_id {
                        tracing::debug!(
                            chat_id = %event.chat_id,
                            message_id = %event.message.id,
                            "suppressing self-echo from the live channel"
                        );
                        return;
                    }

                    let is_active_chat = *lock(&active_chat) == Some(event.chat_id);
                    if is_active_chat {
                        let gateway = gateway.clone();
                        let chat_id = event.chat_id;
                        let message_id = event.message.id;
                        tokio::spawn(async move {
                            if let Err(error) = gateway.mark_message_as_read(message_id).await {
                                tracing::warn!(message_id = %message_id, error = %error, "failed to mark message read");
                            }
                            if let Err(error) = gateway.mark_chat_as_read(chat_id).await {
                                tracing::warn!(chat_id = %chat_id, error = %error, "failed to mark chat read");
                            }
                        });
                    }

                    emit_bus.emit(
                        topics::MESSAGE_RECEIVED,
                        events::encode(&MessageReceived {
                            chat_id: event.chat_id,
                            message: event.message,
                            is_active_chat,
                        }),
                    );
                }),
            ));
        }

        Self { bus, subscriptions }
    }

    pub fn dispose(&mut self) {
        for (topic, id) in self.subscriptions.drain(..) {
            self.bus.off(topic, id);
        }
    }
}

impl Drop for MessageRouter {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn lock(active: &Arc<Mutex<Option<ChatId>>>) -> std::sync::MutexGuard<'_, Option<ChatId>> {
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
