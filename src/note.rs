//! Collaborative note synchronizer for one chat's shared document.
//!
//! Sole writer of the note buffer and its version. Local keystrokes land in
//! an editable buffer and schedule a debounced autosave; saves carry the
//! last known version so the server can reject stale writes (optimistic
//! concurrency). Remote updates apply only when their version is strictly
//! greater than the last known one, which filters out echoes of our own
//! broadcast. Application is last-writer-wins at document granularity: an
//! accepted remote update overwrites the buffer, unsaved keystrokes
//! included.
//!
//! The version counter is server-owned; this component never invents or
//! decrements it.

use chrono::{DateTime, Utc};

use crate::api::NotesApi;
use crate::config::{AUTOSAVE_DEBOUNCE, NOTE_TYPING_TIMEOUT};
use crate::error::ApiError;
use crate::models::{Note, UpdateNoteRequest, User};
use crate::socket::SocketHandle;
use crate::timer::{schedule_once, TimerHandle};
use crate::typing::TypingTracker;

/// Shared-document state for one chat.
pub struct NoteSync<N> {
    api: N,
    socket: SocketHandle,
    chat_id: String,
    note: Option<Note>,
    buffer: String,
    is_saving: bool,
    last_saved_at: Option<DateTime<Utc>>,
    error: Option<String>,
    autosave_timer: Option<TimerHandle>,
    typing: TypingTracker,
    local_typing: bool,
    typing_timer: Option<TimerHandle>,
}

impl<N: NotesApi> NoteSync<N> {
    pub fn new(
        api: N,
        socket: SocketHandle,
        chat_id: impl Into<String>,
        current_user_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            socket,
            chat_id: chat_id.into(),
            note: None,
            buffer: String::new(),
            is_saving: false,
            last_saved_at: None,
            error: None,
            autosave_timer: None,
            typing: TypingTracker::new(current_user_id, NOTE_TYPING_TIMEOUT),
            local_typing: false,
            typing_timer: None,
        }
    }

    /// Fetch the note; the buffer and last known version come from the
    /// response.
    pub async fn load(&mut self) -> Result<(), ApiError> {
        match self.api.fetch_note(&self.chat_id).await {
            Ok(note) => {
                self.buffer = note.content.clone();
                self.note = Some(note);
                self.error = None;
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Record a local keystroke.
    ///
    /// Every edit restarts the autosave debounce; `on_autosave` runs once
    /// the quiet period elapses. The first keystroke also emits an
    /// editing-start signal, and `on_idle` runs if the user goes quiet
    /// without further edits.
    pub fn edited<A, I>(&mut self, content: impl Into<String>, on_autosave: A, on_idle: I)
    where
        A: FnOnce() + Send + 'static,
        I: FnOnce() + Send + 'static,
    {
        self.buffer = content.into();
        self.autosave_timer = Some(schedule_once(AUTOSAVE_DEBOUNCE, on_autosave));

        if !self.local_typing {
            self.local_typing = true;
            self.socket.typing_note(&self.chat_id, true);
        }
        self.typing_timer = Some(schedule_once(NOTE_TYPING_TIMEOUT, on_idle));
    }

    /// Emit the editing-stop signal and disarm the inactivity timer.
    pub fn stop_typing(&mut self) {
        self.typing_timer = None;
        if self.local_typing {
            self.local_typing = false;
            self.socket.typing_note(&self.chat_id, false);
        }
    }

    /// Push the buffer to the server if it differs from the last known
    /// server content.
    ///
    /// A save already in flight suppresses this one rather than queuing it;
    /// the next debounce cycle picks up whatever the buffer holds by then.
    /// On success the authoritative note replaces local state and the new
    /// content is broadcast for sub-second visibility on other clients. On
    /// failure the buffer is left untouched, so no keystroke is lost.
    pub async fn save(&mut self) -> Result<(), ApiError> {
        let Some(note) = &self.note else {
            return Ok(());
        };
        if self.is_saving || self.buffer == note.content {
            return Ok(());
        }

        self.is_saving = true;
        let content = self.buffer.clone();
        let request = UpdateNoteRequest {
            content: content.clone(),
            version: note.version,
        };
        let result = self.api.update_note(&self.chat_id, request).await;
        self.is_saving = false;

        match result {
            Ok(saved) => {
                self.socket
                    .update_note(&self.chat_id, &saved.content, saved.version);
                // Keystrokes made while the save was in flight stay in the
                // buffer; the next debounce cycle saves them.
                if self.buffer == content {
                    self.buffer = saved.content.clone();
                }
                self.note = Some(saved);
                self.last_saved_at = Some(Utc::now());
                self.error = None;
                Ok(())
            }
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Apply a remote update.
    ///
    /// Versions equal to or lower than the last known one are echoes or
    /// stale broadcasts and are discarded. An accepted update overwrites
    /// the buffer unconditionally, current local edits included.
    pub fn apply_remote_update(&mut self, incoming: Note) {
        if incoming.chat_id != self.chat_id {
            return;
        }
        match &self.note {
            Some(note) if incoming.version <= note.version => {
                log::debug!(
                    "discarding stale note update v{} (have v{})",
                    incoming.version,
                    note.version
                );
            }
            _ => {
                self.buffer = incoming.content.clone();
                self.note = Some(incoming);
            }
        }
    }

    /// Apply a remote editing signal for this chat's note.
    pub fn apply_typing(&mut self, user: User, is_typing: bool) {
        self.typing.observe(user, is_typing);
    }

    /// Indicator line for the editor header; empty when nobody is editing.
    pub fn typing_indicator(&mut self) -> String {
        self.typing.display_text("editing")
    }

    /// "Last edited by NAME, 5m ago" caption, when the server reported an
    /// editor.
    pub fn last_edited_caption(&self, now: DateTime<Utc>) -> Option<String> {
        let note = self.note.as_ref()?;
        let editor = note.last_edited_by.as_ref()?;
        Some(format!(
            "Last edited by {}, {}",
            editor.name,
            crate::models::time_ago(note.updated_at, now)
        ))
    }

    /// Save-state caption for the editor footer: "Saving..." while a
    /// request is in flight, "Saved 5m ago" once one has succeeded, empty
    /// before the first save.
    pub fn save_status(&self, now: DateTime<Utc>) -> String {
        if self.is_saving {
            "Saving...".to_string()
        } else if let Some(saved_at) = self.last_saved_at {
            format!("Saved {}", crate::models::time_ago(saved_at, now))
        } else {
            String::new()
        }
    }

    /// Collaborator summary for the editor header.
    pub fn collaborator_summary(&self, current_user_id: Option<&str>) -> String {
        self.note
            .as_ref()
            .map(|n| n.collaborator_names(current_user_id))
            .unwrap_or_default()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn note(&self) -> Option<&Note> {
        self.note.as_ref()
    }

    pub fn version(&self) -> Option<i64> {
        self.note.as_ref().map(|n| n.version)
    }

    pub fn is_saving(&self) -> bool {
        self.is_saving
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.note
            .as_ref()
            .is_some_and(|n| n.content != self.buffer)
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Disarm all timers; called when the editor closes so no stale
    /// callback fires into released state.
    pub fn teardown(&mut self) {
        self.autosave_timer = None;
        self.stop_typing();
        self.typing.clear();
    }
}
