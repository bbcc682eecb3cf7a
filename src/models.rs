//! Domain entities and request/response bodies.
//!
//! Wire shape: camelCase fields, an object-id primary key (`_id`) aliased to
//! the conventional `id`, and ISO-8601 timestamps. The server omits some
//! timestamps on freshly created rows, so missing dates default to "now"
//! rather than failing the decode. Entity equality is by `id` only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

fn default_now() -> DateTime<Utc> {
    Utc::now()
}

// ─── User ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default = "default_now")]
    pub last_seen: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            avatar: None,
            is_online: false,
            last_seen: Utc::now(),
        }
    }

    /// Minimal stand-in for a sender delivered as a bare identifier.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self::new(id, "", "Unknown User")
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for User {}

// ─── Chat ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub participants: Vec<User>,
    pub is_group: bool,
    #[serde(default)]
    pub last_message: Option<Message>,
    #[serde(default = "default_now")]
    pub last_activity: DateTime<Utc>,
    #[serde(default = "default_now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_now")]
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Explicit name if set; otherwise the other participant's name for a
    /// direct chat; otherwise "Group Chat".
    pub fn display_name(&self, current_user_id: Option<&str>) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if !self.is_group {
            let other = match current_user_id {
                Some(me) => self.participants.iter().find(|p| p.id != me),
                None => self.participants.first(),
            };
            if let Some(user) = other {
                return user.name.clone();
            }
            return "Unknown User".into();
        }
        "Group Chat".into()
    }

    /// The participant who is not the current user (direct chats).
    pub fn other_participant(&self, current_user_id: &str) -> Option<&User> {
        self.participants.iter().find(|p| p.id != current_user_id)
    }

    /// Online indicator: the other side for direct chats, any other
    /// participant for groups.
    pub fn is_other_online(&self, current_user_id: &str) -> bool {
        self.participants
            .iter()
            .any(|p| p.id != current_user_id && p.is_online)
    }
}

impl PartialEq for Chat {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Chat {}

// ─── Message ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub chat_id: String,
    #[serde(deserialize_with = "deserialize_sender")]
    pub sender: User,
    pub content: String,
    pub message_type: String,
    #[serde(default = "default_now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_by: Option<Vec<ReadStatus>>,
}

/// The sender field arrives either as a full user object or as a bare id.
/// The bare form is promoted to a placeholder user.
fn deserialize_sender<'de, D>(deserializer: D) -> Result<User, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SenderField {
        Full(Box<User>),
        Id(String),
    }

    match SenderField::deserialize(deserializer)? {
        SenderField::Full(user) => Ok(*user),
        SenderField::Id(id) => Ok(User::placeholder(id)),
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Message {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadStatus {
    pub user: String,
    #[serde(default = "default_now")]
    pub read_at: DateTime<Utc>,
}

// ─── Note ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub last_edited_by: Option<User>,
    pub version: i64,
    #[serde(default)]
    pub collaborators: Vec<Collaborator>,
    #[serde(default = "default_now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_now")]
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// "You", "Alice and Bob", or "Alice, Bob and 2 others".
    pub fn collaborator_names(&self, current_user_id: Option<&str>) -> String {
        let names: Vec<String> = self
            .collaborators
            .iter()
            .map(|c| {
                if Some(c.user.id.as_str()) == current_user_id {
                    "You".to_string()
                } else {
                    c.user.name.clone()
                }
            })
            .collect();

        if names.len() <= 2 {
            names.join(" and ")
        } else {
            let rest = names.len() - 2;
            format!(
                "{} and {} other{}",
                names[..2].join(", "),
                rest,
                if rest > 1 { "s" } else { "" }
            )
        }
    }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Note {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub user: User,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default = "default_now")]
    pub joined_at: DateTime<Utc>,
}

// ─── Request/response bodies ─────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatsResponse {
    pub chats: Vec<Chat>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub participant_ids: Vec<String>,
    pub is_group: bool,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub message: Message,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: String,
    pub message_type: String,
}

impl SendMessageRequest {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: "text".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NoteResponse {
    pub note: Note,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateNoteRequest {
    pub content: String,
    pub version: i64,
}

/// Compact relative-time label for "last edited" and "saved" captions.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 60 {
        "just now".into()
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}
