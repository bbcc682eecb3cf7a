//! Typing indicator aggregation with per-user expiry.
//!
//! One tracker instance per conversation or note. A `true` signal inserts or
//! refreshes the user with a deadline of now + timeout; a `false` signal
//! removes them immediately; entries past their deadline are pruned on read,
//! which bounds how long an indicator can stay stuck if a stop signal is
//! lost. The local user is never shown (filtered by id).

use std::time::Duration;

use tokio::time::Instant;

use crate::models::User;

struct TypingEntry {
    user: User,
    expires_at: Instant,
}

/// Set of currently-typing users for one conversation or document.
pub struct TypingTracker {
    local_user_id: String,
    timeout: Duration,
    entries: Vec<TypingEntry>,
}

impl TypingTracker {
    pub fn new(local_user_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            timeout,
            entries: Vec::new(),
        }
    }

    /// Apply a typing signal for `user`.
    pub fn observe(&mut self, user: User, is_typing: bool) {
        if user.id == self.local_user_id {
            return;
        }
        if is_typing {
            let deadline = Instant::now() + self.timeout;
            if let Some(entry) = self.entries.iter_mut().find(|e| e.user.id == user.id) {
                entry.expires_at = deadline;
            } else {
                self.entries.push(TypingEntry {
                    user,
                    expires_at: deadline,
                });
            }
        } else {
            self.entries.retain(|e| e.user.id != user.id);
        }
    }

    fn prune(&mut self) {
        let now = Instant::now();
        self.entries.retain(|e| e.expires_at > now);
    }

    /// Users currently typing, oldest signal first.
    pub fn users(&mut self) -> Vec<&User> {
        self.prune();
        self.entries.iter().map(|e| &e.user).collect()
    }

    pub fn is_empty(&mut self) -> bool {
        self.prune();
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Indicator line; `verb` is "typing" for chats and "editing" for notes.
    /// Empty when nobody is typing.
    pub fn display_text(&mut self, verb: &str) -> String {
        self.prune();
        match self.entries.len() {
            0 => String::new(),
            1 => format!("{} is {verb}...", self.entries[0].user.name),
            2 => format!(
                "{} and {} are {verb}...",
                self.entries[0].user.name, self.entries[1].user.name
            ),
            _ => format!("Several people are {verb}..."),
        }
    }
}
