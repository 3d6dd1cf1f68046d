use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use snafu::OptionExt;

use super::error::{GatewayResult, NotFoundSnafu};
use super::ids::{ChatId, MessageId, UserId};
use super::types::{
    ChatKind, ChatSummary, Contact, LastMessage, Message, MessageKind, NewChat, ProfilePatch,
    UserRecord,
};
use super::{ChatGateway, ContactGateway, MessageGateway, UserGateway};

/// In-memory development backend seeded with a small fixed dataset.
///
/// Stands in for the real API during development and in tests; state lives
/// for the lifetime of the process.
pub struct MockGateway {
    state: Mutex<MockState>,
}

struct MockState {
    users: Vec<UserRecord>,
    chats: Vec<ChatSummary>,
    messages: HashMap<ChatId, Vec<Message>>,
    contacts: Vec<ContactEntry>,
    current_user: UserId,
    next_chat_id: i64,
    next_message_id: i64,
}

struct ContactEntry {
    user_id: UserId,
    added_at: chrono::DateTime<Utc>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::seeded()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // Lock poisoning only happens after a panic in this module; propagate the data anyway.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    fn seeded() -> Self {
        let now = Utc::now();
        let users = vec![
            UserRecord {
                id: UserId::new(1),
                name: "You".to_string(),
                username: "me".to_string(),
                avatar_url: Some("assets/me.png".to_string()),
                bio: Some("Sample bio text".to_string()),
                phone: Some("+7 123 456 7890".to_string()),
                email: Some("me@example.com".to_string()),
                is_online: true,
                last_seen: now,
            },
            UserRecord {
                id: UserId::new(2),
                name: "Anna Smirnova".to_string(),
                username: "anna_s".to_string(),
                avatar_url: Some("assets/anna.png".to_string()),
                bio: Some("UI/UX Designer".to_string()),
                phone: Some("+7 987 654 3210".to_string()),
                email: Some("anna@example.com".to_string()),
                is_online: true,
                last_seen: now - Duration::minutes(5),
            },
            UserRecord {
                id: UserId::new(3),
                name: "Maxim Petrov".to_string(),
                username: "max_dev".to_string(),
                avatar_url: Some("assets/max.png".to_string()),
                bio: Some("Fullstack developer".to_string()),
                phone: Some("+7 555 123 4567".to_string()),
                email: Some("max@example.com".to_string()),
                is_online: false,
                last_seen: now - Duration::hours(2),
            },
        ];

        let chats = vec![
            ChatSummary {
                id: ChatId::new(1),
                peer_id: UserId::new(2),
                kind: ChatKind::Private,
                name: "Anna Smirnova".to_string(),
                avatar_url: Some("assets/anna.png".to_string()),
                last_message: Some(LastMessage {
                    text: "Hi! How's the project going?".to_string(),
                    time: now - Duration::minutes(10),
                    sender_id: UserId::new(2),
                    is_read: false,
                }),
                unread_count: 2,
                is_pinned: false,
                is_muted: false,
            },
            ChatSummary {
                id: ChatId::new(2),
                peer_id: UserId::new(3),
                kind: ChatKind::Private,
                name: "Maxim Petrov".to_string(),
                avatar_url: Some("assets/max.png".to_string()),
                last_message: Some(LastMessage {
                    text: "Please check this code".to_string(),
                    time: now - Duration::hours(2),
                    sender_id: UserId::new(1),
                    is_read: true,
                }),
                unread_count: 0,
                is_pinned: true,
                is_muted: false,
            },
        ];

        let mut messages = HashMap::new();
        messages.insert(
            ChatId::new(1),
            vec![
                Message {
                    id: MessageId::new(1),
                    chat_id: ChatId::new(1),
                    sender_id: UserId::new(2),
                    sender_name: Some("Anna".to_string()),
                    text: "Hi! How's the project going?".to_string(),
                    sent_at: now - Duration::hours(1),
                    kind: MessageKind::Text,
                    is_read: true,
                    is_edited: false,
                    edited_at: None,
                },
                Message {
                    id: MessageId::new(2),
                    chat_id: ChatId::new(1),
                    sender_id: UserId::new(1),
                    sender_name: Some("You".to_string()),
                    text: "Going well, thanks!".to_string(),
                    sent_at: now - Duration::minutes(55),
                    kind: MessageKind::Text,
                    is_read: true,
                    is_edited: false,
                    edited_at: None,
                },
            ],
        );
        messages.insert(
            ChatId::new(2),
            vec![Message {
                id: MessageId::new(6),
                chat_id: ChatId::new(2),
                sender_id: UserId::new(3),
                sender_name: Some("Maxim".to_string()),
                text: "Do you have time to look at the code?".to_string(),
                sent_at: now - Duration::hours(3),
                kind: MessageKind::Text,
                is_read: true,
                is_edited: false,
                edited_at: None,
            }],
        );

        let contacts = vec![
            ContactEntry {
                user_id: UserId::new(2),
                added_at: now - Duration::days(7),
            },
            ContactEntry {
                user_id: UserId::new(3),
                added_at: now - Duration::days(3),
            },
        ];

        Self {
            users,
            chats,
            messages,
            contacts,
            current_user: UserId::new(1),
            next_chat_id: 3,
            next_message_id: 100,
        }
    }

    fn user(&self, user_id: UserId) -> Option<&UserRecord> {
        self.users.iter().find(|user| user.id == user_id)
    }

    fn chat_mut(&mut self, chat_id: ChatId) -> Option<&mut ChatSummary> {
        self.chats.iter_mut().find(|chat| chat.id == chat_id)
    }
}

#[async_trait]
impl ChatGateway for MockGateway {
    async fn get_chats(&self, offset: usize, limit: usize) -> GatewayResult<Vec<ChatSummary>> {
        let state = self.lock();
        Ok(state.chats.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn get_chat(&self, chat_id: ChatId) -> GatewayResult<ChatSummary> {
        let state = self.lock();
        state
            .chats
            .iter()
            .find(|chat| chat.id == chat_id)
            .cloned()
            .with_context(|| NotFoundSnafu {
                stage: "mock-get-chat",
                entity: "chat",
                id: chat_id.to_string(),
            })
    }

    async fn create_chat(&self, spec: NewChat) -> GatewayResult<ChatSummary> {
        let mut state = self.lock();

        // The API returns an existing private chat with the same peer instead of duplicating it.
        if let Some(existing) = state
            .chats
            .iter()
            .find(|chat| chat.kind == ChatKind::Private && chat.peer_id == spec.peer_id)
        {
            return Ok(existing.clone());
        }

        let chat = ChatSummary {
            id: ChatId::new(state.next_chat_id),
            peer_id: spec.peer_id,
            kind: spec.kind,
            name: spec.name,
            avatar_url: spec.avatar_url,
            last_message: None,
            unread_count: 0,
            is_pinned: false,
            is_muted: false,
        };
        state.next_chat_id += 1;
        state.chats.push(chat.clone());
        state.messages.insert(chat.id, Vec::new());
        Ok(chat)
    }

    async fn delete_chat(&self, chat_id: ChatId) -> GatewayResult<()> {
        let mut state = self.lock();
        state.chats.retain(|chat| chat.id != chat_id);
        state.messages.remove(&chat_id);
        Ok(())
    }

    async fn toggle_chat_pin(&self, chat_id: ChatId) -> GatewayResult<ChatSummary> {
        let mut state = self.lock();
        let chat = state.chat_mut(chat_id).with_context(|| NotFoundSnafu {
            stage: "mock-toggle-pin",
            entity: "chat",
            id: chat_id.to_string(),
        })?;
        chat.is_pinned = !chat.is_pinned;
        Ok(chat.clone())
    }

    async fn toggle_chat_mute(&self, chat_id: ChatId) -> GatewayResult<ChatSummary> {
        let mut state = self.lock();
        let chat = state.chat_mut(chat_id).with_context(|| NotFoundSnafu {
            stage: "mock-toggle-mute",
            entity: "chat",
            id: chat_id.to_string(),
        })?;
        chat.is_muted = !chat.is_muted;
        Ok(chat.clone())
    }

    async fn mark_chat_as_read(&self, chat_id: ChatId) -> GatewayResult<()> {
        let mut state = self.lock();
        if let Some(chat) = state.chat_mut(chat_id) {
            chat.unread_count = 0;
            if let Some(last) = chat.last_message.as_mut() {
                last.is_read = true;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessageGateway for MockGateway {
    async fn get_messages(
        &self,
        chat_id: ChatId,
        offset: usize,
        limit: usize,
    ) -> GatewayResult<Vec<Message>> {
        let state = self.lock();
        Ok(state
            .messages
            .get(&chat_id)
            .map(|thread| thread.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> GatewayResult<Message> {
        let mut state = self.lock();
        let sender_id = state.current_user;
        let sender_name = state.user(sender_id).map(|user| user.name.clone());
        let message = Message {
            id: MessageId::new(state.next_message_id),
            chat_id,
            sender_id,
            sender_name,
            text: text.to_string(),
            sent_at: Utc::now(),
            kind: MessageKind::Text,
            is_read: true,
            is_edited: false,
            edited_at: None,
        };
        state.next_message_id += 1;
        state.messages.entry(chat_id).or_default().push(message.clone());

        if let Some(chat) = state.chat_mut(chat_id) {
            chat.last_message = Some(LastMessage {
                text: message.text.clone(),
                time: message.sent_at,
                sender_id: message.sender_id,
                is_read: true,
            });
        }
        Ok(message)
    }

    async fn edit_message(&self, message_id: MessageId, text: &str) -> GatewayResult<Message> {
        let mut state = self.lock();
        for thread in state.messages.values_mut() {
            if let Some(message) = thread.iter_mut().find(|message| message.id == message_id) {
                message.text = text.to_string();
                message.is_edited = true;
                message.edited_at = Some(Utc::now());
                return Ok(message.clone());
            }
        }
        NotFoundSnafu {
            stage: "mock-edit-message",
            entity: "message",
            id: message_id.to_string(),
        }
        .fail()
    }

    async fn delete_message(&self, message_id: MessageId) -> GatewayResult<()> {
        let mut state = self.lock();
        for thread in state.messages.values_mut() {
            thread.retain(|message| message.id != message_id);
        }
        Ok(())
    }

    async fn mark_message_as_read(&self, message_id: MessageId) -> GatewayResult<()> {
        let mut state = self.lock();
        for thread in state.messages.values_mut() {
            if let Some(message) = thread.iter_mut().find(|message| message.id == message_id) {
                message.is_read = true;
                return Ok(());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserGateway for MockGateway {
    async fn get_users_by_ids(&self, ids: &[UserId]) -> GatewayResult<Vec<UserRecord>> {
        let state = self.lock();
        Ok(state
            .users
            .iter()
            .filter(|user| ids.contains(&user.id))
            .cloned()
            .collect())
    }

    async fn get_all_users(&self) -> GatewayResult<Vec<UserRecord>> {
        let state = self.lock();
        Ok(state.users.clone())
    }

    async fn get_user(&self, user_id: UserId) -> GatewayResult<UserRecord> {
        let state = self.lock();
        state.user(user_id).cloned().with_context(|| NotFoundSnafu {
            stage: "mock-get-user",
            entity: "user",
            id: user_id.to_string(),
        })
    }

    async fn get_current_user(&self) -> GatewayResult<UserRecord> {
        let state = self.lock();
        let current = state.current_user;
        state.user(current).cloned().with_context(|| NotFoundSnafu {
            stage: "mock-get-current-user",
            entity: "user",
            id: current.to_string(),
        })
    }

    async fn update_current_user(&self, patch: ProfilePatch) -> GatewayResult<UserRecord> {
        let mut state = self.lock();
        let current = state.current_user;
        let user = state
            .users
            .iter_mut()
            .find(|user| user.id == current)
            .with_context(|| NotFoundSnafu {
                stage: "mock-update-current-user",
                entity: "user",
                id: current.to_string(),
            })?;

        let patch = patch.normalized();
        if let Some(name) = patch.name {
            user.name = name;
        }
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(bio) = patch.bio {
            user.bio = Some(bio);
        }
        if let Some(phone) = patch.phone {
            user.phone = Some(phone);
        }
        if let Some(email) = patch.email {
            user.email = Some(email);
        }
        if let Some(avatar_url) = patch.avatar_url {
            user.avatar_url = Some(avatar_url);
        }
        Ok(user.clone())
    }

    async fn search_users(&self, query: &str) -> GatewayResult<Vec<UserRecord>> {
        let state = self.lock();
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(state
            .users
            .iter()
            .filter(|user| user.id != state.current_user)
            .filter(|user| {
                user.name.to_lowercase().contains(&needle)
                    || user.username.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ContactGateway for MockGateway {
    async fn get_contacts(&self) -> GatewayResult<Vec<Contact>> {
        let state = self.lock();
        Ok(state
            .contacts
            .iter()
            .filter_map(|entry| {
                state.user(entry.user_id).map(|user| Contact {
                    user: user.clone(),
                    added_at: entry.added_at,
                })
            })
            .collect())
    }

    async fn add_contact(&self, user_id: UserId) -> GatewayResult<bool> {
        let mut state = self.lock();
        if state.contacts.iter().any(|entry| entry.user_id == user_id) {
            return Ok(false);
        }
        state.contacts.push(ContactEntry {
            user_id,
            added_at: Utc::now(),
        });
        Ok(true)
    }

    async fn remove_contact(&self, user_id: UserId) -> GatewayResult<bool> {
        let mut state = self.lock();
        state.contacts.retain(|entry| entry.user_id != user_id);
        Ok(true)
    }

    async fn is_contact(&self, user_id: UserId) -> GatewayResult<bool> {
        let state = self.lock();
        Ok(state.contacts.iter().any(|entry| entry.user_id == user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_chat_returns_existing_private_chat_for_same_peer() {
        let gateway = MockGateway::new();
        let chat = gateway
            .create_chat(NewChat {
                peer_id: UserId::new(2),
                kind: ChatKind::Private,
                name: "Anna Smirnova".to_string(),
                avatar_url: None,
            })
            .await
            .unwrap();
        assert_eq!(chat.id, ChatId::new(1));
    }

    #[tokio::test]
    async fn send_message_updates_chat_summary() {
        let gateway = MockGateway::new();
        let message = gateway.send_message(ChatId::new(1), "hello").await.unwrap();
        assert_eq!(message.sender_id, UserId::new(1));

        let chat = gateway.get_chat(ChatId::new(1)).await.unwrap();
        let last = chat.last_message.unwrap();
        assert_eq!(last.text, "hello");
        assert_eq!(last.sender_id, UserId::new(1));
    }

    #[tokio::test]
    async fn contact_add_is_idempotent_on_duplicates() {
        let gateway = MockGateway::new();
        assert!(!gateway.add_contact(UserId::new(2)).await.unwrap());
        assert!(gateway.add_contact(UserId::new(99)).await.unwrap());
        assert!(gateway.is_contact(UserId::new(99)).await.unwrap());
        assert!(gateway.remove_contact(UserId::new(99)).await.unwrap());
        assert!(!gateway.is_contact(UserId::new(99)).await.unwrap());
    }

    #[tokio::test]
    async fn mark_chat_as_read_clears_unread_count() {
        let gateway = MockGateway::new();
        gateway.mark_chat_as_read(ChatId::new(1)).await.unwrap();
        let chat = gateway.get_chat(ChatId::new(1)).await.unwrap();
        assert_eq!(chat.unread_count, 0);
        assert!(chat.last_message.unwrap().is_read);
    }
}
