//! REST transport.
//!
//! [`ApiService`] wraps a shared `reqwest` client, attaches the bearer token
//! from the [`TokenStore`], and maps HTTP failures onto [`ApiError`]. A 401
//! clears the token store before the error is returned, so every caller sees
//! a consistent signed-out state.
//!
//! The per-concern traits (`AuthApi`, `ChatsApi`, `MessagesApi`, `NotesApi`)
//! exist so reconcilers stay generic over the transport and tests can script
//! responses without a server.

use std::future::Future;
use std::sync::Arc;

use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::TokenStore;
use crate::config::{endpoints, ApiConfig};
use crate::error::ApiError;
use crate::models::{
    AuthResponse, Chat, ChatsResponse, CreateChatRequest, LoginRequest, Message, MessageResponse,
    MessagesResponse, Note, NoteResponse, RegisterRequest, SendMessageRequest, UpdateNoteRequest,
    User,
};

/// Account endpoints.
pub trait AuthApi: Send + Sync {
    fn register(
        &self,
        req: RegisterRequest,
    ) -> impl Future<Output = Result<AuthResponse, ApiError>> + Send;
    fn login(
        &self,
        req: LoginRequest,
    ) -> impl Future<Output = Result<AuthResponse, ApiError>> + Send;
    fn current_user(&self) -> impl Future<Output = Result<User, ApiError>> + Send;
}

/// Chat collection endpoints.
pub trait ChatsApi: Send + Sync {
    fn fetch_chats(&self) -> impl Future<Output = Result<Vec<Chat>, ApiError>> + Send;
    fn create_chat(
        &self,
        req: CreateChatRequest,
    ) -> impl Future<Output = Result<Chat, ApiError>> + Send;
}

/// Message history and durable sends.
pub trait MessagesApi: Send + Sync {
    fn fetch_messages(
        &self,
        chat_id: &str,
    ) -> impl Future<Output = Result<Vec<Message>, ApiError>> + Send;
    fn send_message(
        &self,
        chat_id: &str,
        req: SendMessageRequest,
    ) -> impl Future<Output = Result<Message, ApiError>> + Send;
}

/// Shared note fetch and save.
pub trait NotesApi: Send + Sync {
    fn fetch_note(&self, chat_id: &str) -> impl Future<Output = Result<Note, ApiError>> + Send;
    fn update_note(
        &self,
        chat_id: &str,
        req: UpdateNoteRequest,
    ) -> impl Future<Output = Result<Note, ApiError>> + Send;
}

/// Failure body shape; the server may also return non-JSON on 5xx.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map a non-success status and its body to the error taxonomy.
fn map_failure(status: StatusCode, body: &[u8]) -> ApiError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.message)
        .ok();
    if status.is_client_error() {
        ApiError::ClientError(message.unwrap_or_else(|| "Request failed".into()))
    } else {
        ApiError::ServerError(message.unwrap_or_else(|| "Server error".into()))
    }
}

/// HTTP client bound to one backend.
#[derive(Clone)]
pub struct ApiService {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenStore>,
}

impl ApiService {
    pub fn new(config: &ApiConfig, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            base_url: config.base_url.clone(),
            client: reqwest::Client::new(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Url::parse(&format!("{}{}", self.base_url, path)).map_err(|_| ApiError::InvalidEndpoint)
    }

    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(path)?;
        let mut builder = self.client.request(method, url);
        if let Some(token) = self.tokens.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if status == StatusCode::UNAUTHORIZED {
            // One dead token must not produce an endless stream of 401s.
            self.tokens.clear();
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(map_failure(status, &bytes));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request::<T, ()>(Method::GET, path, None).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(Method::PUT, path, Some(body)).await
    }
}

impl AuthApi for ApiService {
    async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.post(endpoints::REGISTER, &req).await
    }

    async fn login(&self, req: LoginRequest) -> Result<AuthResponse, ApiError> {
        self.post(endpoints::LOGIN, &req).await
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        #[derive(Deserialize)]
        struct MeResponse {
            user: User,
        }
        let response: MeResponse = self.get(endpoints::ME).await?;
        Ok(response.user)
    }
}

impl ChatsApi for ApiService {
    async fn fetch_chats(&self) -> Result<Vec<Chat>, ApiError> {
        let response: ChatsResponse = self.get(endpoints::CHATS).await?;
        Ok(response.chats)
    }

    async fn create_chat(&self, req: CreateChatRequest) -> Result<Chat, ApiError> {
        #[derive(Deserialize)]
        struct ChatResponse {
            chat: Chat,
        }
        let response: ChatResponse = self.post(endpoints::CHATS, &req).await?;
        Ok(response.chat)
    }
}

impl MessagesApi for ApiService {
    async fn fetch_messages(&self, chat_id: &str) -> Result<Vec<Message>, ApiError> {
        let response: MessagesResponse = self.get(&endpoints::messages(chat_id)).await?;
        Ok(response.messages)
    }

    async fn send_message(&self, chat_id: &str, req: SendMessageRequest) -> Result<Message, ApiError> {
        let response: MessageResponse = self.post(&endpoints::messages(chat_id), &req).await?;
        Ok(response.message)
    }
}

impl NotesApi for ApiService {
    async fn fetch_note(&self, chat_id: &str) -> Result<Note, ApiError> {
        let response: NoteResponse = self.get(&endpoints::notes(chat_id)).await?;
        Ok(response.note)
    }

    async fn update_note(&self, chat_id: &str, req: UpdateNoteRequest) -> Result<Note, ApiError> {
        let response: NoteResponse = self.put(&endpoints::notes(chat_id), &req).await?;
        Ok(response.note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryTokenStore;

    #[test]
    fn test_url_joining() {
        let service = ApiService::new(
            &ApiConfig::new("http://localhost:3000", "ws://localhost:3000"),
            Arc::new(MemoryTokenStore::new()),
        );
        let url = service.url("/api/chats").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/chats");

        let service = ApiService::new(
            &ApiConfig::new("not a url", ""),
            Arc::new(MemoryTokenStore::new()),
        );
        assert!(matches!(
            service.url("/api/chats"),
            Err(ApiError::InvalidEndpoint)
        ));
    }

    #[test]
    fn test_map_failure_uses_server_message() {
        let err = map_failure(
            StatusCode::NOT_FOUND,
            br#"{"message":"Chat not found"}"#,
        );
        assert_eq!(err.to_string(), "Chat not found");

        let err = map_failure(StatusCode::BAD_REQUEST, b"<html>nope</html>");
        assert_eq!(err.to_string(), "Request failed");
    }

    #[test]
    fn test_map_failure_server_errors() {
        let err = map_failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            br#"{"message":"db down"}"#,
        );
        assert_eq!(err.to_string(), "Server error: db down");

        let err = map_failure(StatusCode::BAD_GATEWAY, b"");
        assert_eq!(err.to_string(), "Server error: Server error");
    }
}
