//! Chat list reconciler.
//!
//! Sole writer of the ordered conversation collection. The collection is
//! always sorted by `last_activity` descending; every fetch replacement and
//! every event application re-establishes that order. Loading every chat also
//! announces room membership (join-on-load) so push events start flowing for
//! all of them.

use crate::api::ChatsApi;
use crate::error::ApiError;
use crate::models::{Chat, CreateChatRequest, Message, User};
use crate::socket::SocketHandle;

/// Ordered set of conversations for the signed-in user.
pub struct ChatList<C> {
    api: C,
    socket: SocketHandle,
    current_user_id: Option<String>,
    chats: Vec<Chat>,
    is_loading: bool,
    has_loaded: bool,
    error: Option<String>,
    /// Monotonic fetch counter; a completed fetch applies only if it is
    /// still the latest one issued.
    fetch_seq: u64,
}

impl<C: ChatsApi> ChatList<C> {
    pub fn new(api: C, socket: SocketHandle, current_user_id: Option<String>) -> Self {
        Self {
            api,
            socket,
            current_user_id,
            chats: Vec::new(),
            is_loading: false,
            has_loaded: false,
            error: None,
            fetch_seq: 0,
        }
    }

    /// Fetch the full chat list, replace the collection, and join every
    /// loaded chat's room. A load while one is already in flight is a no-op.
    pub async fn load(&mut self) -> Result<(), ApiError> {
        if self.is_loading {
            return Ok(());
        }
        self.is_loading = true;
        let result = self.fetch_and_replace().await;
        self.is_loading = false;
        if result.is_ok() {
            self.has_loaded = true;
            let ids: Vec<String> = self.chats.iter().map(|c| c.id.clone()).collect();
            self.socket.join_chats(&ids);
        }
        result
    }

    /// Re-fetch and replace without re-announcing joins.
    pub async fn refresh(&mut self) -> Result<(), ApiError> {
        self.fetch_and_replace().await
    }

    async fn fetch_and_replace(&mut self) -> Result<(), ApiError> {
        self.fetch_seq += 1;
        let seq = self.fetch_seq;
        match self.api.fetch_chats().await {
            Ok(chats) => {
                // A newer fetch has been issued meanwhile; this result is stale.
                if seq == self.fetch_seq {
                    self.chats = chats;
                    self.sort();
                    self.error = None;
                }
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Start a direct conversation with one user.
    pub async fn create_direct_chat(&mut self, user_id: &str) -> Result<Chat, ApiError> {
        self.create_chat(CreateChatRequest {
            participant_ids: vec![user_id.to_string()],
            is_group: false,
            name: None,
        })
        .await
    }

    /// Start a named group conversation.
    pub async fn create_group_chat(
        &mut self,
        name: &str,
        participant_ids: Vec<String>,
    ) -> Result<Chat, ApiError> {
        self.create_chat(CreateChatRequest {
            participant_ids,
            is_group: true,
            name: Some(name.to_string()),
        })
        .await
    }

    async fn create_chat(&mut self, req: CreateChatRequest) -> Result<Chat, ApiError> {
        match self.api.create_chat(req).await {
            Ok(chat) => {
                // A push event may already have inserted it.
                if !self.chats.iter().any(|c| c.id == chat.id) {
                    self.chats.push(chat.clone());
                    self.sort();
                }
                self.socket.join_chats(std::slice::from_ref(&chat.id));
                self.error = None;
                Ok(chat)
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Fold a delivered message into its chat's denormalized preview and
    /// re-sort. A message for an unloaded chat is ignored; the next refresh
    /// resolves the staleness.
    pub fn apply_new_message(&mut self, message: &Message) {
        let Some(chat) = self.chats.iter_mut().find(|c| c.id == message.chat_id) else {
            return;
        };
        chat.last_message = Some(message.clone());
        chat.last_activity = message.created_at;
        self.sort();
    }

    /// Update the presence flag for `user` wherever they participate.
    pub fn apply_presence(&mut self, user: &User, online: bool) {
        for chat in &mut self.chats {
            for participant in &mut chat.participants {
                if participant.id == user.id {
                    participant.is_online = online;
                    participant.last_seen = user.last_seen;
                }
            }
        }
    }

    /// Case-insensitive substring filter over display name and last message
    /// content. Never mutates the underlying collection; an empty query
    /// yields everything.
    pub fn filtered(&self, query: &str) -> Vec<&Chat> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return self.chats.iter().collect();
        }
        self.chats
            .iter()
            .filter(|chat| {
                chat.display_name(self.current_user_id.as_deref())
                    .to_lowercase()
                    .contains(&query)
                    || chat
                        .last_message
                        .as_ref()
                        .is_some_and(|m| m.content.to_lowercase().contains(&query))
            })
            .collect()
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn has_loaded(&self) -> bool {
        self.has_loaded
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear(&mut self) {
        self.chats.clear();
        self.has_loaded = false;
        self.error = None;
    }

    fn sort(&mut self) {
        self.chats
            .sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    }
}
