use courier_core::events::{
    self, WsMessageDeleted, WsMessageEdited, WsNewMessage, WsUserStatus,
};
use courier_core::topics;
use courier_gateway::{ChatId, Message, MessageId, UserId};
use serde::Deserialize;
use serde_json::Value;

/// Inbound live-update envelope, discriminated by its `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEnvelope {
    NewMessage { message: Message },
    MessageEdited { message: Message },
    MessageDeleted { message: DeletedMessageRef },
    UserStatus { user_id: UserId, is_online: bool },
    /// Keep-alive echo.
    Ping,
    /// Server-side delivery acknowledgement for a message this client sent.
    MessageReceived {},
}

/// Minimal reference carried by a deletion envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMessageRef {
    pub id: MessageId,
    pub chat_id: ChatId,
}

const KNOWN_TYPES: &[&str] = &[
    "new_message",
    "message_edited",
    "message_deleted",
    "user_status",
    "ping",
    "message_received",
];

/// Outcome of mapping one wire frame onto the bus surface.
#[derive(Debug)]
pub enum Translation {
    /// A known envelope, mapped 1:1 onto a bus topic.
    Emit(&'static str, Value),
    /// A known envelope that carries nothing for the UI (heartbeat echoes).
    Absorb(&'static str),
    /// An unrecognized `type`; dropped.
    Unknown(String),
    /// Not JSON, missing its discriminator, or a known type with a bad body.
    Malformed(String),
}

/// Translates a raw text frame. Never panics; anything the client does not
/// understand degrades to [`Translation::Unknown`] or
/// [`Translation::Malformed`].
pub fn translate(raw: &str) -> Translation {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(error) => return Translation::Malformed(format!("invalid json: {error}")),
    };

    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Translation::Malformed("missing 'type' discriminator".to_string());
    };

    if !KNOWN_TYPES.contains(&kind) {
        return Translation::Unknown(kind.to_string());
    }

    let envelope: InboundEnvelope = match serde_json::from_value(value.clone()) {
        Ok(envelope) => envelope,
        Err(error) => {
            return Translation::Malformed(format!("bad '{kind}' envelope: {error}"));
        }
    };

    match envelope {
        InboundEnvelope::NewMessage { message } => Translation::Emit(
            topics::WEBSOCKET_NEW_MESSAGE,
            events::encode(&WsNewMessage {
                chat_id: message.chat_id,
                message,
            }),
        ),
        InboundEnvelope::MessageEdited { message } => Translation::Emit(
            topics::WEBSOCKET_MESSAGE_EDITED,
            events::encode(&WsMessageEdited {
                chat_id: message.chat_id,
                message_id: message.id,
                new_text: message.text,
                edited_at: message.edited_at,
            }),
        ),
        InboundEnvelope::MessageDeleted { message } => Translation::Emit(
            topics::WEBSOCKET_MESSAGE_DELETED,
            events::encode(&WsMessageDeleted {
                chat_id: message.chat_id,
                message_id: message.id,
            }),
        ),
        InboundEnvelope::UserStatus { user_id, is_online } => Translation::Emit(
            topics::WEBSOCKET_USER_STATUS,
            events::encode(&WsUserStatus { user_id, is_online }),
        ),
        InboundEnvelope::Ping => Translation::Absorb("ping"),
        InboundEnvelope::MessageReceived {} => Translation::Absorb("message_received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::events::decode;

    #[test]
    fn new_message_maps_to_its_topic_with_the_chat_id_lifted() {
        let raw = serde_json::json!({
            "type": "new_message",
            "message": {
                "id": 7,
                "chatId": 1,
                "senderId": 2,
                "text": "hello",
                "time": "2026-01-01T12:00:00Z"
            }
        })
        .to_string();

        match translate(&raw) {
            Translation::Emit(topic, payload) => {
                assert_eq!(topic, topics::WEBSOCKET_NEW_MESSAGE);
                let event: WsNewMessage = decode(&payload).unwrap();
                assert_eq!(event.chat_id, ChatId::new(1));
                assert_eq!(event.message.text, "hello");
            }
            other => panic!("expected an emit, got {other:?}"),
        }
    }

    #[test]
    fn user_status_uses_snake_case_wire_fields() {
        let raw = r#"{"type":"user_status","user_id":3,"is_online":false}"#;
        match translate(raw) {
            Translation::Emit(topic, payload) => {
                assert_eq!(topic, topics::WEBSOCKET_USER_STATUS);
                let event: WsUserStatus = decode(&payload).unwrap();
                assert_eq!(event.user_id, UserId::new(3));
                assert!(!event.is_online);
            }
            other => panic!("expected an emit, got {other:?}"),
        }
    }

    #[test]
    fn message_deleted_needs_only_the_reference_fields() {
        let raw = r#"{"type":"message_deleted","message":{"id":9,"chatId":4}}"#;
        match translate(raw) {
            Translation::Emit(topic, payload) => {
                assert_eq!(topic, topics::WEBSOCKET_MESSAGE_DELETED);
                let event: WsMessageDeleted = decode(&payload).unwrap();
                assert_eq!(event.message_id, MessageId::new(9));
                assert_eq!(event.chat_id, ChatId::new(4));
            }
            other => panic!("expected an emit, got {other:?}"),
        }
    }

    #[test]
    fn unknown_types_are_dropped_not_errors() {
        let raw = r#"{"type":"typing_indicator","user_id":2}"#;
        assert!(matches!(translate(raw), Translation::Unknown(kind) if kind == "typing_indicator"));
    }

    #[test]
    fn heartbeat_echoes_are_absorbed() {
        assert!(matches!(translate(r#"{"type":"ping"}"#), Translation::Absorb("ping")));
        assert!(matches!(
            translate(r#"{"type":"message_received","message":{}}"#),
            Translation::Absorb("message_received")
        ));
    }

    #[test]
    fn garbage_frames_are_malformed_not_fatal() {
        assert!(matches!(translate("not json"), Translation::Malformed(_)));
        assert!(matches!(translate(r#"{"payload":1}"#), Translation::Malformed(_)));
        assert!(matches!(
            translate(r#"{"type":"new_message","message":{"id":"seven"}}"#),
            Translation::Malformed(_)
        ));
    }
}
