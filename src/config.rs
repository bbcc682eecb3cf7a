//! Endpoints, socket event names, and timing constants.

use std::time::Duration;

/// Quiet period after the last note edit before an autosave fires.
pub const AUTOSAVE_DEBOUNCE: Duration = Duration::from_secs(2);

/// Inactivity window after which a local chat typing indicator auto-stops,
/// and after which a remote chat typing entry expires.
pub const CHAT_TYPING_TIMEOUT: Duration = Duration::from_secs(2);

/// Inactivity window for note-editing typing indicators.
pub const NOTE_TYPING_TIMEOUT: Duration = Duration::from_secs(3);

/// Gap between consecutive messages beyond which a timestamp is shown.
pub const TIMESTAMP_GAP: Duration = Duration::from_secs(300);

/// Base URLs for the REST API and the push connection.
///
/// Injected into [`crate::api::ApiService`] and [`crate::socket::SocketClient`]
/// so tests can point at an in-process server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub socket_url: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, socket_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            socket_url: socket_url.into(),
        }
    }
}

/// REST endpoint paths.
pub mod endpoints {
    pub const REGISTER: &str = "/api/auth/register";
    pub const LOGIN: &str = "/api/auth/login";
    pub const ME: &str = "/api/auth/me";
    pub const CHATS: &str = "/api/chats";

    pub fn messages(chat_id: &str) -> String {
        format!("/api/messages/{chat_id}")
    }

    pub fn notes(chat_id: &str) -> String {
        format!("/api/notes/{chat_id}")
    }
}

/// Named events on the push connection.
pub mod events {
    // Outbound intents.
    pub const JOIN_CHATS: &str = "join-chats";
    pub const SEND_MESSAGE: &str = "send-message";
    pub const TYPING_MESSAGE: &str = "typing-message";
    pub const UPDATE_NOTE: &str = "update-note";
    pub const TYPING_NOTE: &str = "typing-note";

    // Inbound server events.
    pub const NEW_MESSAGE: &str = "new-message";
    pub const USER_ONLINE: &str = "user-online";
    pub const USER_OFFLINE: &str = "user-offline";
    pub const USER_TYPING_MESSAGE: &str = "user-typing-message";
    pub const USER_TYPING_NOTE: &str = "user-typing-note";
    pub const NOTE_UPDATED: &str = "note-updated";
}
