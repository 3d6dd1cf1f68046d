//! Typed payloads for the bus topics the core produces and consumes.
//!
//! Payloads cross the bus as `serde_json::Value`; these structs are the typed
//! edges, converted with [`encode`] and [`decode`].

use chrono::{DateTime, Utc};
use courier_gateway::{ChatId, ChatSummary, Message, MessageId, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Emitted when a chat row is chosen; loads the chat into the secondary region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSelected {
    pub chat: ChatSummary,
}

/// Emitted after the local user's message was accepted by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSent {
    pub chat_id: ChatId,
    pub message: Message,
}

/// Fan-out of one inbound message to both regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceived {
    pub chat_id: ChatId,
    pub message: Message,
    pub is_active_chat: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileRequested {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenChatWithUser {
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default)]
    pub user_avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCreated {
    pub chat: ChatSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDeleted {
    pub chat_id: ChatId,
}

/// Inbound message envelope translated from the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsNewMessage {
    pub chat_id: ChatId,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsMessageEdited {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub new_text: String,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsMessageDeleted {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsUserStatus {
    pub user_id: UserId,
    pub is_online: bool,
}

/// Status change notification from the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusChanged {
    pub user_id: UserId,
    pub is_online: bool,
}

/// Region a routed navigation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPanel {
    Primary,
    Secondary,
}

/// Frontend intent: a `data-route` style navigation to a named component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequested {
    pub route: crate::component::ComponentKind,
    pub panel: TargetPanel,
}

/// Frontend intent: the composer submitted text for the open chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequested {
    pub text: String,
}

/// Frontend intent: the search input changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQueryChanged {
    pub query: String,
}

/// Frontend intent: the profile editor form was submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSaveRequested {
    pub patch: courier_gateway::ProfilePatch,
}

/// Frontend intent targeting a user row (add/remove contact).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactActionRequested {
    pub user_id: UserId,
}

/// Frontend intent targeting a chat row (pin/mute/delete).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatActionRequested {
    pub chat_id: ChatId,
}

/// Serializes a payload for the bus; serialization failures degrade to a
/// marker object rather than poisoning the emit.
pub fn encode<T: Serialize>(payload: &T) -> Value {
    serde_json::to_value(payload).unwrap_or_else(|error| {
        tracing::warn!(error = %error, "failed to encode event payload");
        serde_json::json!({ "_encoding": "error" })
    })
}

/// Deserializes a bus payload, logging and returning `None` on shape mismatch.
pub fn decode<T: DeserializeOwned>(value: &Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(payload) => Some(payload),
        Err(error) => {
            tracing::warn!(error = %error, "failed to decode event payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_received_round_trips_through_the_bus_encoding() {
        let payload = MessageReceived {
            chat_id: ChatId::new(1),
            message: Message {
                id: MessageId::new(7),
                chat_id: ChatId::new(1),
                sender_id: UserId::new(2),
                sender_name: Some("Anna".to_string()),
                text: "hello".to_string(),
                sent_at: Utc::now(),
                kind: Default::default(),
                is_read: false,
                is_edited: false,
                edited_at: None,
            },
            is_active_chat: true,
        };

        let value = encode(&payload);
        assert_eq!(decode::<MessageReceived>(&value), Some(payload));
    }

    #[test]
    fn decode_shape_mismatch_returns_none() {
        let value = serde_json::json!({ "unexpected": true });
        assert_eq!(decode::<WsUserStatus>(&value), None);
    }
}
