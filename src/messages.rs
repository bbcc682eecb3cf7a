//! Message stream reconciler for one open conversation.
//!
//! Sole writer of that chat's message history. The list is sorted ascending
//! by `created_at` with unique ids; the same message can be observed from
//! the HTTP create response and from the push broadcast, in either order, so
//! every insert path deduplicates by id.
//!
//! Sending is optimistic at the UX level only: the compose buffer is cleared
//! immediately and restored on failure. The durable copy travels over HTTP;
//! the matching push emit is a low-latency hint for other participants.

use crate::api::MessagesApi;
use crate::config::{CHAT_TYPING_TIMEOUT, TIMESTAMP_GAP};
use crate::error::ApiError;
use crate::models::{Message, SendMessageRequest, User};
use crate::socket::SocketHandle;
use crate::timer::{schedule_once, TimerHandle};
use crate::typing::TypingTracker;

/// History, compose state, and typing indicators for one open chat.
pub struct MessageStream<M> {
    api: M,
    socket: SocketHandle,
    chat_id: String,
    current_user_id: String,
    is_group: bool,
    messages: Vec<Message>,
    draft: String,
    is_loading: bool,
    is_sending: bool,
    error: Option<String>,
    typing: TypingTracker,
    local_typing: bool,
    typing_timer: Option<TimerHandle>,
}

impl<M: MessagesApi> MessageStream<M> {
    pub fn new(
        api: M,
        socket: SocketHandle,
        chat_id: impl Into<String>,
        current_user_id: impl Into<String>,
        is_group: bool,
    ) -> Self {
        let current_user_id = current_user_id.into();
        Self {
            api,
            socket,
            chat_id: chat_id.into(),
            current_user_id: current_user_id.clone(),
            is_group,
            messages: Vec::new(),
            draft: String::new(),
            is_loading: false,
            is_sending: false,
            error: None,
            typing: TypingTracker::new(current_user_id, CHAT_TYPING_TIMEOUT),
            local_typing: false,
            typing_timer: None,
        }
    }

    /// Fetch the full history and replace the local list.
    pub async fn load_history(&mut self) -> Result<(), ApiError> {
        self.is_loading = true;
        let result = self.api.fetch_messages(&self.chat_id).await;
        self.is_loading = false;
        match result {
            Ok(fetched) => {
                // Dedup by id before sorting; adjacent-only dedup would miss
                // equal ids carrying different timestamps.
                let mut seen = std::collections::HashSet::with_capacity(fetched.len());
                self.messages = fetched
                    .into_iter()
                    .filter(|m| seen.insert(m.id.clone()))
                    .collect();
                self.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                self.error = None;
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Record a compose-buffer change. Emits a typing-start signal on the
    /// first keystroke and (re)arms the inactivity timer; `on_idle` runs if
    /// the user goes quiet without sending.
    pub fn draft_changed<F>(&mut self, text: impl Into<String>, on_idle: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.draft = text.into();
        if self.draft.trim().is_empty() {
            self.stop_typing();
            return;
        }
        if !self.local_typing {
            self.local_typing = true;
            self.socket.typing_message(&self.chat_id, true);
        }
        self.typing_timer = Some(schedule_once(CHAT_TYPING_TIMEOUT, on_idle));
    }

    /// Emit the typing-stop signal and disarm the inactivity timer.
    pub fn stop_typing(&mut self) {
        self.typing_timer = None;
        if self.local_typing {
            self.local_typing = false;
            self.socket.typing_message(&self.chat_id, false);
        }
    }

    /// Send the trimmed compose buffer.
    ///
    /// The buffer is cleared before the request and restored on failure.
    /// The response message is folded in through the same deduplicating
    /// insert that handles the push broadcast, so arrival order between the
    /// two does not matter.
    pub async fn send(&mut self) -> Result<(), ApiError> {
        let content = self.draft.trim().to_string();
        if content.is_empty() || self.is_sending {
            return Ok(());
        }
        self.draft.clear();
        self.stop_typing();
        self.is_sending = true;

        // Low-latency hint for other participants; not the durable path.
        self.socket.send_message(&self.chat_id, &content);

        let result = self
            .api
            .send_message(&self.chat_id, SendMessageRequest::text(&content))
            .await;
        self.is_sending = false;
        match result {
            Ok(message) => {
                self.insert(message);
                self.error = None;
                Ok(())
            }
            Err(err) => {
                self.draft = content;
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Fold a push-delivered message into the history. Messages for other
    /// chats are ignored; a sender's pending typing indicator is cleared by
    /// their own message.
    pub fn apply_new_message(&mut self, message: Message) {
        if message.chat_id != self.chat_id {
            return;
        }
        self.typing.observe(message.sender.clone(), false);
        self.insert(message);
    }

    /// Apply a remote typing signal for this chat.
    pub fn apply_typing(&mut self, user: User, is_typing: bool) {
        self.typing.observe(user, is_typing);
    }

    /// Indicator line for the footer; empty when nobody is typing.
    pub fn typing_indicator(&mut self) -> String {
        self.typing.display_text("typing")
    }

    /// Whether to show the sender's name above the message at `index`:
    /// group chats only, never for own messages, and only when the previous
    /// message has a different sender.
    pub fn should_show_sender_name(&self, index: usize) -> bool {
        let Some(message) = self.messages.get(index) else {
            return false;
        };
        if !self.is_group || message.sender.id == self.current_user_id {
            return false;
        }
        match index.checked_sub(1).and_then(|i| self.messages.get(i)) {
            Some(previous) => previous.sender.id != message.sender.id,
            None => true,
        }
    }

    /// Whether to show a timestamp under the message at `index`: on the last
    /// message, before a sender change, or before a quiet gap.
    pub fn should_show_timestamp(&self, index: usize) -> bool {
        let Some(message) = self.messages.get(index) else {
            return false;
        };
        match self.messages.get(index + 1) {
            None => true,
            Some(next) => {
                next.sender.id != message.sender.id
                    || (next.created_at - message.created_at).num_seconds()
                        > TIMESTAMP_GAP.as_secs() as i64
            }
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft_silently(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_sending(&self) -> bool {
        self.is_sending
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn insert(&mut self, message: Message) {
        if self.messages.iter().any(|m| m.id == message.id) {
            return;
        }
        self.messages.push(message);
        self.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;
    use crate::router::EventRouter;
    use crate::socket::SocketClient;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::{Arc, Mutex};

    struct FakeMessagesApi {
        history: Mutex<Vec<Result<Vec<Message>, ApiError>>>,
        sends: Mutex<Vec<Result<Message, ApiError>>>,
    }

    impl FakeMessagesApi {
        fn new() -> Self {
            Self {
                history: Mutex::new(Vec::new()),
                sends: Mutex::new(Vec::new()),
            }
        }
    }

    impl MessagesApi for &FakeMessagesApi {
        async fn fetch_messages(&self, _chat_id: &str) -> Result<Vec<Message>, ApiError> {
            self.history.lock().unwrap().remove(0)
        }

        async fn send_message(
            &self,
            _chat_id: &str,
            _req: SendMessageRequest,
        ) -> Result<Message, ApiError> {
            self.sends.lock().unwrap().remove(0)
        }
    }

    fn socket_handle() -> SocketHandle {
        SocketClient::new(
            "ws://127.0.0.1:1",
            Arc::new(MemoryTokenStore::new()),
            Arc::new(EventRouter::new(16)),
        )
        .handle()
    }

    fn message(id: &str, sender: &str, seconds: i64) -> Message {
        let base = Utc.with_ymd_and_hms(2025, 8, 8, 12, 0, 0).unwrap();
        Message {
            id: id.into(),
            chat_id: "c1".into(),
            sender: User::new(sender, "", sender),
            content: format!("body {id}"),
            message_type: "text".into(),
            created_at: base + ChronoDuration::seconds(seconds),
            edited_at: None,
            read_by: None,
        }
    }

    fn stream(api: &FakeMessagesApi, is_group: bool) -> MessageStream<&FakeMessagesApi> {
        MessageStream::new(api, socket_handle(), "c1", "me", is_group)
    }

    #[tokio::test]
    async fn test_history_sorted_ascending() {
        let api = FakeMessagesApi::new();
        api.history.lock().unwrap().push(Ok(vec![
            message("m3", "u2", 30),
            message("m1", "u2", 10),
            message("m2", "u2", 20),
        ]));
        let mut stream = stream(&api, false);
        stream.load_history().await.unwrap();

        let ids: Vec<&str> = stream.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn test_history_collapses_duplicate_ids_with_differing_timestamps() {
        let api = FakeMessagesApi::new();
        api.history.lock().unwrap().push(Ok(vec![
            message("m1", "u2", 10),
            message("m2", "u2", 20),
            message("m1", "u2", 40), // same id, later timestamp
        ]));
        let mut stream = stream(&api, false);
        stream.load_history().await.unwrap();

        let ids: Vec<&str> = stream.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2"]);
    }

    #[tokio::test]
    async fn test_push_and_response_never_duplicate() {
        let api = FakeMessagesApi::new();
        api.history.lock().unwrap().push(Ok(vec![]));
        api.sends.lock().unwrap().push(Ok(message("m1", "me", 10)));
        let mut stream = stream(&api, false);
        stream.load_history().await.unwrap();

        // Push broadcast arrives before the HTTP response completes.
        stream.apply_new_message(message("m1", "me", 10));
        stream.set_draft_silently("body m1");
        stream.send().await.unwrap();
        assert_eq!(stream.messages().len(), 1);

        // And an echo after the response is also dropped.
        stream.apply_new_message(message("m1", "me", 10));
        assert_eq!(stream.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_interleaved_events_keep_order_and_uniqueness() {
        let api = FakeMessagesApi::new();
        api.history
            .lock()
            .unwrap()
            .push(Ok(vec![message("m1", "u2", 10), message("m2", "u2", 20)]));
        let mut stream = stream(&api, false);

        stream.apply_new_message(message("m2", "u2", 20));
        stream.apply_new_message(message("m4", "u2", 40));
        stream.load_history().await.unwrap();
        stream.apply_new_message(message("m3", "u2", 30));

        let ids: Vec<&str> = stream.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn test_send_failure_restores_draft() {
        let api = FakeMessagesApi::new();
        api.sends
            .lock()
            .unwrap()
            .push(Err(ApiError::ServerError("db down".into())));
        let mut stream = stream(&api, false);
        stream.set_draft_silently("  hello  ");

        assert!(stream.send().await.is_err());
        assert_eq!(stream.draft(), "hello");
        assert_eq!(stream.error(), Some("Server error: db down"));
        assert!(stream.messages().is_empty());
    }

    #[tokio::test]
    async fn test_send_clears_draft_on_success() {
        let api = FakeMessagesApi::new();
        api.sends.lock().unwrap().push(Ok(message("m1", "me", 10)));
        let mut stream = stream(&api, false);
        stream.set_draft_silently("hello");

        stream.send().await.unwrap();
        assert_eq!(stream.draft(), "");
        assert_eq!(stream.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_draft_send_is_noop() {
        let api = FakeMessagesApi::new(); // would panic if the API were hit
        let mut stream = stream(&api, false);
        stream.set_draft_silently("   ");
        stream.send().await.unwrap();
        assert!(stream.messages().is_empty());
    }

    #[tokio::test]
    async fn test_message_for_other_chat_ignored() {
        let api = FakeMessagesApi::new();
        let mut stream = stream(&api, false);
        let mut other = message("m1", "u2", 10);
        other.chat_id = "other".into();
        stream.apply_new_message(other);
        assert!(stream.messages().is_empty());
    }

    #[tokio::test]
    async fn test_senders_message_clears_their_typing() {
        let api = FakeMessagesApi::new();
        let mut stream = stream(&api, false);
        stream.apply_typing(User::new("u2", "", "Dana"), true);
        assert_eq!(stream.typing_indicator(), "Dana is typing...");

        stream.apply_new_message(message("m1", "u2", 10));
        assert_eq!(stream.typing_indicator(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_typing_expires() {
        let api = FakeMessagesApi::new();
        let mut stream = stream(&api, false);
        stream.apply_typing(User::new("u2", "", "Dana"), true);

        tokio::time::advance(std::time::Duration::from_millis(1999)).await;
        assert_eq!(stream.typing_indicator(), "Dana is typing...");

        tokio::time::advance(std::time::Duration::from_millis(2)).await;
        assert_eq!(stream.typing_indicator(), "");
    }

    #[tokio::test]
    async fn test_sender_name_policy() {
        let api = FakeMessagesApi::new();
        api.history.lock().unwrap().push(Ok(vec![
            message("m1", "u2", 10),
            message("m2", "u2", 20),
            message("m3", "u3", 30),
            message("m4", "me", 40),
        ]));
        let mut group = stream(&api, true);
        group.load_history().await.unwrap();

        assert!(group.should_show_sender_name(0)); // first from u2
        assert!(!group.should_show_sender_name(1)); // consecutive u2
        assert!(group.should_show_sender_name(2)); // sender change
        assert!(!group.should_show_sender_name(3)); // own message

        let api2 = FakeMessagesApi::new();
        api2.history
            .lock()
            .unwrap()
            .push(Ok(vec![message("m1", "u2", 10)]));
        let mut direct = MessageStream::new(&api2, socket_handle(), "c1", "me", false);
        direct.load_history().await.unwrap();
        assert!(!direct.should_show_sender_name(0)); // never in direct chats
    }

    #[tokio::test]
    async fn test_timestamp_policy() {
        let api = FakeMessagesApi::new();
        api.history.lock().unwrap().push(Ok(vec![
            message("m1", "u2", 0),
            message("m2", "u2", 10),    // same sender, small gap
            message("m3", "u2", 320),   // gap to m2 exceeds 300s
            message("m4", "me", 330),   // sender change after m3
        ]));
        let mut stream = stream(&api, false);
        stream.load_history().await.unwrap();

        assert!(!stream.should_show_timestamp(0));
        assert!(stream.should_show_timestamp(1)); // before the long gap
        assert!(stream.should_show_timestamp(2)); // before the sender change
        assert!(stream.should_show_timestamp(3)); // last message
    }
}
