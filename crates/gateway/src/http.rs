use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use snafu::{OptionExt, ResultExt};

use super::error::{
    DecodeResponseSnafu, GatewayResult, HttpRequestSnafu, HttpStatusSnafu, MissingCredentialSnafu,
};
use super::ids::{ChatId, MessageId, UserId};
use super::session::SessionStore;
use super::types::{
    ChatKind, ChatSummary, Contact, Message, NewChat, ProfilePatch, UserRecord,
};
use super::{ChatGateway, ContactGateway, MessageGateway, UserGateway};

/// REST backend speaking the messenger API, authenticated with the bearer
/// credential from the session store.
pub struct HttpGateway {
    base_url: String,
    client: reqwest::Client,
    session: Arc<SessionStore>,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, session: Arc<SessionStore>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn bearer(&self, stage: &'static str) -> GatewayResult<String> {
        self.session
            .access_token()
            .context(MissingCredentialSnafu { stage })
    }

    async fn expect_success(
        stage: &'static str,
        response: reqwest::Response,
    ) -> GatewayResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        HttpStatusSnafu {
            stage,
            status: status.as_u16(),
            body,
        }
        .fail()
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        stage: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<T> {
        let token = self.bearer(stage)?;
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .context(HttpRequestSnafu { stage })?;
        Self::expect_success(stage, response)
            .await?
            .json::<T>()
            .await
            .context(DecodeResponseSnafu { stage })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        stage: &'static str,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> GatewayResult<T> {
        let token = self.bearer(stage)?;
        let mut request = self
            .client
            .request(method, self.url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.context(HttpRequestSnafu { stage })?;
        Self::expect_success(stage, response)
            .await?
            .json::<T>()
            .await
            .context(DecodeResponseSnafu { stage })
    }

    async fn send_no_content(
        &self,
        stage: &'static str,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> GatewayResult<()> {
        let token = self.bearer(stage)?;
        let mut request = self
            .client
            .request(method, self.url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.context(HttpRequestSnafu { stage })?;
        Self::expect_success(stage, response).await.map(|_| ())
    }
}

#[async_trait]
impl ChatGateway for HttpGateway {
    async fn get_chats(&self, offset: usize, limit: usize) -> GatewayResult<Vec<ChatSummary>> {
        self.get_json(
            "http-get-chats",
            "/chats",
            &[("offset", offset.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn get_chat(&self, chat_id: ChatId) -> GatewayResult<ChatSummary> {
        self.get_json("http-get-chat", &format!("/chats/{chat_id}"), &[])
            .await
    }

    async fn create_chat(&self, spec: NewChat) -> GatewayResult<ChatSummary> {
        let body = json!({
            "participant_ids": [spec.peer_id],
            "name": spec.name,
            "is_group": spec.kind == ChatKind::Group,
            "avatar_url": spec.avatar_url,
        });
        self.send_json(
            "http-create-chat",
            reqwest::Method::POST,
            "/chats",
            Some(body),
        )
        .await
    }

    async fn delete_chat(&self, chat_id: ChatId) -> GatewayResult<()> {
        self.send_no_content(
            "http-delete-chat",
            reqwest::Method::DELETE,
            &format!("/chats/{chat_id}"),
            None,
        )
        .await
    }

    async fn toggle_chat_pin(&self, chat_id: ChatId) -> GatewayResult<ChatSummary> {
        self.send_json(
            "http-toggle-chat-pin",
            reqwest::Method::POST,
            &format!("/chats/{chat_id}/pin"),
            None,
        )
        .await
    }

    async fn toggle_chat_mute(&self, chat_id: ChatId) -> GatewayResult<ChatSummary> {
        self.send_json(
            "http-toggle-chat-mute",
            reqwest::Method::POST,
            &format!("/chats/{chat_id}/mute"),
            None,
        )
        .await
    }

    async fn mark_chat_as_read(&self, chat_id: ChatId) -> GatewayResult<()> {
        // Read receipts are best-effort; a failure here must not break chat startup.
        if let Err(error) = self
            .send_no_content(
                "http-mark-chat-read",
                reqwest::Method::POST,
                &format!("/chats/{chat_id}/read"),
                None,
            )
            .await
        {
            tracing::warn!(chat_id = %chat_id, error = %error, "failed to mark chat as read");
        }
        Ok(())
    }
}

#[async_trait]
impl MessageGateway for HttpGateway {
    async fn get_messages(
        &self,
        chat_id: ChatId,
        offset: usize,
        limit: usize,
    ) -> GatewayResult<Vec<Message>> {
        self.get_json(
            "http-get-messages",
            &format!("/messages/chat/{chat_id}"),
            &[("offset", offset.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> GatewayResult<Message> {
        let body = json!({ "chat_id": chat_id, "text": text });
        self.send_json(
            "http-send-message",
            reqwest::Method::POST,
            "/messages",
            Some(body),
        )
        .await
    }

    async fn edit_message(&self, message_id: MessageId, text: &str) -> GatewayResult<Message> {
        let body = json!({ "text": text });
        self.send_json(
            "http-edit-message",
            reqwest::Method::PUT,
            &format!("/messages/{message_id}"),
            Some(body),
        )
        .await
    }

    async fn delete_message(&self, message_id: MessageId) -> GatewayResult<()> {
        self.send_no_content(
            "http-delete-message",
            reqwest::Method::DELETE,
            &format!("/messages/{message_id}"),
            None,
        )
        .await
    }

    async fn mark_message_as_read(&self, message_id: MessageId) -> GatewayResult<()> {
        self.send_no_content(
            "http-mark-message-read",
            reqwest::Method::POST,
            &format!("/messages/{message_id}/read"),
            None,
        )
        .await
    }
}

#[async_trait]
impl UserGateway for HttpGateway {
    async fn get_users_by_ids(&self, ids: &[UserId]) -> GatewayResult<Vec<UserRecord>> {
        let body = json!({ "user_ids": ids });
        self.send_json(
            "http-get-users-batch",
            reqwest::Method::POST,
            "/users/batch",
            Some(body),
        )
        .await
    }

    async fn get_all_users(&self) -> GatewayResult<Vec<UserRecord>> {
        self.get_json("http-get-all-users", "/users", &[]).await
    }

    async fn get_user(&self, user_id: UserId) -> GatewayResult<UserRecord> {
        self.get_json("http-get-user", &format!("/users/{user_id}"), &[])
            .await
    }

    async fn get_current_user(&self) -> GatewayResult<UserRecord> {
        self.get_json("http-get-current-user", "/users/me", &[]).await
    }

    async fn update_current_user(&self, patch: ProfilePatch) -> GatewayResult<UserRecord> {
        let patch = patch.normalized();
        let body = serde_json::to_value(&patch).unwrap_or(Value::Null);
        self.send_json(
            "http-update-current-user",
            reqwest::Method::PATCH,
            "/users/me",
            Some(body),
        )
        .await
    }

    async fn search_users(&self, query: &str) -> GatewayResult<Vec<UserRecord>> {
        self.get_json(
            "http-search-users",
            "/users/search",
            &[("q", query.to_string())],
        )
        .await
    }
}

#[async_trait]
impl ContactGateway for HttpGateway {
    async fn get_contacts(&self) -> GatewayResult<Vec<Contact>> {
        self.get_json("http-get-contacts", "/contacts", &[]).await
    }

    async fn add_contact(&self, user_id: UserId) -> GatewayResult<bool> {
        let body = json!({ "user_id": user_id });
        self.send_no_content(
            "http-add-contact",
            reqwest::Method::POST,
            "/contacts",
            Some(body),
        )
        .await
        .map(|_| true)
    }

    async fn remove_contact(&self, user_id: UserId) -> GatewayResult<bool> {
        self.send_no_content(
            "http-remove-contact",
            reqwest::Method::DELETE,
            &format!("/contacts/{user_id}"),
            None,
        )
        .await
        .map(|_| true)
    }

    async fn is_contact(&self, user_id: UserId) -> GatewayResult<bool> {
        let stage = "http-is-contact";
        let token = self.bearer(stage)?;
        let response = self
            .client
            .get(self.url(&format!("/contacts/{user_id}")))
            .bearer_auth(token)
            .send()
            .await
            .context(HttpRequestSnafu { stage })?;

        // Not-found means "not a contact", not an error.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let payload: Value = Self::expect_success(stage, response)
            .await?
            .json()
            .await
            .context(DecodeResponseSnafu { stage })?;
        Ok(payload
            .get("is_contact")
            .or_else(|| payload.get("isContact"))
            .and_then(Value::as_bool)
            .unwrap_or(true))
    }
}
