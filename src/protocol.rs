//! Wire protocol for the push connection.
//!
//! Frames are JSON text messages tagged with an event name:
//!
//! ```text
//! {"event":"new-message","data":{ ...payload... }}
//! ```
//!
//! Inbound frames decode into the closed [`ServerEvent`] set; a malformed
//! payload is dropped by the router (logged, never fatal). Outbound intents
//! are built by the `outbound` constructors and are fire-and-forget.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::events;
use crate::models::{Message, Note, User};

/// One frame on the push connection, in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Typing payload shared by the chat and note typing events.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload {
    chat_id: String,
    user: User,
    is_typing: bool,
}

/// Closed set of domain events delivered by the server.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    NewMessage(Message),
    UserPresence {
        user: User,
        online: bool,
    },
    TypingInChat {
        chat_id: String,
        user: User,
        is_typing: bool,
    },
    NoteUpdated(Note),
    TypingInNote {
        chat_id: String,
        user: User,
        is_typing: bool,
    },
    /// The push connection came up (or back up).
    Connected,
    /// The push connection dropped.
    Disconnected,
}

/// Decode an inbound frame into a [`ServerEvent`].
///
/// Returns `None` for unknown event names and for payloads that fail to
/// decode; the caller logs and moves on.
pub fn decode_event(frame: &Frame) -> Option<ServerEvent> {
    fn payload<T: serde::de::DeserializeOwned>(event: &str, data: &Value) -> Option<T> {
        match serde_json::from_value(data.clone()) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                log::warn!("dropping malformed '{event}' payload: {err}");
                None
            }
        }
    }

    match frame.event.as_str() {
        events::NEW_MESSAGE => payload(&frame.event, &frame.data).map(ServerEvent::NewMessage),
        events::USER_ONLINE => payload(&frame.event, &frame.data)
            .map(|user| ServerEvent::UserPresence { user, online: true }),
        events::USER_OFFLINE => payload(&frame.event, &frame.data).map(|user| {
            ServerEvent::UserPresence {
                user,
                online: false,
            }
        }),
        events::USER_TYPING_MESSAGE => {
            payload::<TypingPayload>(&frame.event, &frame.data).map(|p| {
                ServerEvent::TypingInChat {
                    chat_id: p.chat_id,
                    user: p.user,
                    is_typing: p.is_typing,
                }
            })
        }
        events::NOTE_UPDATED => payload(&frame.event, &frame.data).map(ServerEvent::NoteUpdated),
        events::USER_TYPING_NOTE => {
            payload::<TypingPayload>(&frame.event, &frame.data).map(|p| {
                ServerEvent::TypingInNote {
                    chat_id: p.chat_id,
                    user: p.user,
                    is_typing: p.is_typing,
                }
            })
        }
        other => {
            log::debug!("ignoring unknown event '{other}'");
            None
        }
    }
}

/// Outbound intent frames.
pub mod outbound {
    use super::*;

    pub fn join_chats(chat_ids: &[String]) -> Frame {
        Frame::new(events::JOIN_CHATS, json!(chat_ids))
    }

    pub fn send_message(chat_id: &str, content: &str) -> Frame {
        Frame::new(
            events::SEND_MESSAGE,
            json!({ "chatId": chat_id, "content": content }),
        )
    }

    pub fn typing_message(chat_id: &str, is_typing: bool) -> Frame {
        Frame::new(
            events::TYPING_MESSAGE,
            json!({ "chatId": chat_id, "isTyping": is_typing }),
        )
    }

    pub fn update_note(chat_id: &str, content: &str, version: i64) -> Frame {
        Frame::new(
            events::UPDATE_NOTE,
            json!({ "chatId": chat_id, "content": content, "version": version }),
        )
    }

    pub fn typing_note(chat_id: &str, is_typing: bool) -> Frame {
        Frame::new(
            events::TYPING_NOTE,
            json!({ "chatId": chat_id, "isTyping": is_typing }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_value(id: &str, name: &str) -> Value {
        json!({ "_id": id, "email": "", "name": name })
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = outbound::typing_message("c1", true);
        let encoded = frame.encode().unwrap();
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded.event, "typing-message");
        assert_eq!(decoded.data["chatId"], "c1");
        assert_eq!(decoded.data["isTyping"], true);
    }

    #[test]
    fn test_decode_new_message() {
        let frame = Frame::new(
            events::NEW_MESSAGE,
            json!({
                "_id": "m1", "chatId": "c1", "sender": user_value("u1", "Alice"),
                "content": "hello", "messageType": "text",
                "createdAt": "2025-08-08T10:00:00.000Z"
            }),
        );
        match decode_event(&frame) {
            Some(ServerEvent::NewMessage(m)) => {
                assert_eq!(m.id, "m1");
                assert_eq!(m.sender.name, "Alice");
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_decode_presence_events() {
        let online = Frame::new(events::USER_ONLINE, user_value("u1", "Alice"));
        match decode_event(&online) {
            Some(ServerEvent::UserPresence { user, online }) => {
                assert_eq!(user.id, "u1");
                assert!(online);
            }
            other => panic!("unexpected decode: {other:?}"),
        }

        let offline = Frame::new(events::USER_OFFLINE, user_value("u1", "Alice"));
        assert!(matches!(
            decode_event(&offline),
            Some(ServerEvent::UserPresence { online: false, .. })
        ));
    }

    #[test]
    fn test_decode_typing_events() {
        let data = json!({
            "chatId": "c1",
            "user": user_value("u2", "Bob"),
            "isTyping": true
        });
        let chat = Frame::new(events::USER_TYPING_MESSAGE, data.clone());
        assert!(matches!(
            decode_event(&chat),
            Some(ServerEvent::TypingInChat { is_typing: true, .. })
        ));

        let note = Frame::new(events::USER_TYPING_NOTE, data);
        match decode_event(&note) {
            Some(ServerEvent::TypingInNote { chat_id, user, .. }) => {
                assert_eq!(chat_id, "c1");
                assert_eq!(user.name, "Bob");
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_decode_note_updated() {
        let frame = Frame::new(
            events::NOTE_UPDATED,
            json!({
                "_id": "n1", "chatId": "c1", "content": "Hello world",
                "version": 2, "collaborators": []
            }),
        );
        match decode_event(&frame) {
            Some(ServerEvent::NoteUpdated(n)) => {
                assert_eq!(n.version, 2);
                assert_eq!(n.content, "Hello world");
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_payload_dropped() {
        let frame = Frame::new(events::NEW_MESSAGE, json!({ "nope": true }));
        assert!(decode_event(&frame).is_none());

        let typing = Frame::new(events::USER_TYPING_MESSAGE, json!("not an object"));
        assert!(decode_event(&typing).is_none());
    }

    #[test]
    fn test_unknown_event_ignored() {
        let frame = Frame::new("mystery-event", json!({}));
        assert!(decode_event(&frame).is_none());
    }

    #[test]
    fn test_outbound_shapes() {
        let join = outbound::join_chats(&["c1".into(), "c2".into()]);
        assert_eq!(join.event, "join-chats");
        assert_eq!(join.data, json!(["c1", "c2"]));

        let send = outbound::send_message("c1", "hi");
        assert_eq!(send.data["content"], "hi");

        let note = outbound::update_note("c1", "text", 4);
        assert_eq!(note.event, "update-note");
        assert_eq!(note.data["version"], 4);
    }
}
