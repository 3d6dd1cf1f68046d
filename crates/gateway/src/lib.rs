pub mod error;
pub mod http;
pub mod ids;
pub mod mock;
pub mod session;
pub mod types;

use async_trait::async_trait;

pub use error::{GatewayError, GatewayResult};
pub use http::HttpGateway;
pub use ids::{ChatId, MessageId, UserId};
pub use mock::MockGateway;
pub use session::{SessionError, SessionStore, StoredSession};
pub use types::{
    ChatKind, ChatSummary, Contact, LastMessage, Message, MessageKind, NewChat, ProfilePatch,
    UserRecord,
};

#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn get_chats(&self, offset: usize, limit: usize) -> GatewayResult<Vec<ChatSummary>>;
    async fn get_chat(&self, chat_id: ChatId) -> GatewayResult<ChatSummary>;
    async fn create_chat(&self, spec: NewChat) -> GatewayResult<ChatSummary>;
    async fn delete_chat(&self, chat_id: ChatId) -> GatewayResult<()>;
    async fn toggle_chat_pin(&self, chat_id: ChatId) -> GatewayResult<ChatSummary>;
    async fn toggle_chat_mute(&self, chat_id: ChatId) -> GatewayResult<ChatSummary>;
    async fn mark_chat_as_read(&self, chat_id: ChatId) -> GatewayResult<()>;
}

#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn get_messages(
        &self,
        chat_id: ChatId,
        offset: usize,
        limit: usize,
    ) -> GatewayResult<Vec<Message>>;
    async fn send_message(&self, chat_id: ChatId, text: &str) -> GatewayResult<Message>;
    async fn edit_message(&self, message_id: MessageId, text: &str) -> GatewayResult<Message>;
    async fn delete_message(&self, message_id: MessageId) -> GatewayResult<()>;
    async fn mark_message_as_read(&self, message_id: MessageId) -> GatewayResult<()>;
}

#[async_trait]
pub trait UserGateway: Send + Sync {
    async fn get_users_by_ids(&self, ids: &[UserId]) -> GatewayResult<Vec<UserRecord>>;
    async fn get_all_users(&self) -> GatewayResult<Vec<UserRecord>>;
    async fn get_user(&self, user_id: UserId) -> GatewayResult<UserRecord>;
    async fn get_current_user(&self) -> GatewayResult<UserRecord>;
    async fn update_current_user(&self, patch: ProfilePatch) -> GatewayResult<UserRecord>;
    async fn search_users(&self, query: &str) -> GatewayResult<Vec<UserRecord>>;
}

#[async_trait]
pub trait ContactGateway: Send + Sync {
    async fn get_contacts(&self) -> GatewayResult<Vec<Contact>>;
    async fn add_contact(&self, user_id: UserId) -> GatewayResult<bool>;
    async fn remove_contact(&self, user_id: UserId) -> GatewayResult<bool>;
    /// Absence of a contact record reads as `false`, never as an error.
    async fn is_contact(&self, user_id: UserId) -> GatewayResult<bool>;
}

pub trait DataGateway: ChatGateway + MessageGateway + UserGateway + ContactGateway {}

impl<T> DataGateway for T where T: ChatGateway + MessageGateway + UserGateway + ContactGateway {}
