//! Client-side real-time synchronization engine for a chat-plus-shared-notes
//! product.
//!
//! The crate reconciles locally held state (chat list, message history, one
//! shared note per chat) against a stream of server-pushed events and
//! against REST responses, presenting one consistent view:
//!
//! ```text
//!                    ┌──────────────┐
//!   websocket ──────▶│ SocketClient │───▶ EventRouter ──▶ broadcast
//!                    └──────────────┘                        │
//!                    ┌──────────────┐     ┌─────────────────▼──────┐
//!   REST (reqwest)──▶│  ApiService  │────▶│       SyncEngine       │
//!                    └──────────────┘     │  ChatList              │
//!                                         │  MessageStream (open)  │
//!                                         │  NoteSync      (open)  │
//!                                         └────────────────────────┘
//! ```
//!
//! All domain mutation happens on the engine's single logical update loop;
//! reconcilers are the sole writers of their collections. The push
//! connection is fire-and-forget for outbound intents; durable writes go
//! over HTTP and are merged back in with de-duplication, so either arrival
//! order of response and broadcast yields the same state.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use collabnotes_sync::{
//!     ApiConfig, ApiService, AuthSession, EngineCommand, EventRouter,
//!     MemoryTokenStore, SocketClient, SyncEngine, TokenStore,
//! };
//!
//! # async fn wiring() -> Result<(), collabnotes_sync::ApiError> {
//! let config = ApiConfig::new("http://localhost:3000", "ws://localhost:3000/ws");
//! let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
//! let api = ApiService::new(&config, tokens.clone());
//!
//! let session = AuthSession::new(api.clone(), tokens.clone());
//! let user = session.login("ada@example.com", "hunter22").await?;
//!
//! let router = Arc::new(EventRouter::default());
//! let socket = Arc::new(SocketClient::new(config.socket_url.clone(), tokens, router.clone()));
//! let (mut engine, handle) = SyncEngine::new(api, socket, router, user);
//!
//! tokio::spawn(async move { engine.run().await });
//! handle.send(EngineCommand::Connect);
//! handle.send(EngineCommand::LoadChats);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod chat_list;
pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod models;
pub mod note;
pub mod protocol;
pub mod router;
pub mod socket;
pub mod timer;
pub mod typing;

pub use api::{ApiService, AuthApi, ChatsApi, MessagesApi, NotesApi};
pub use auth::{AuthSession, MemoryTokenStore, TokenStore};
pub use chat_list::ChatList;
pub use config::ApiConfig;
pub use engine::{EngineCommand, EngineHandle, SyncEngine};
pub use error::ApiError;
pub use messages::MessageStream;
pub use models::{Chat, Collaborator, Message, Note, ReadStatus, User};
pub use note::NoteSync;
pub use protocol::{Frame, ServerEvent};
pub use router::EventRouter;
pub use socket::{ConnectionState, SocketClient, SocketHandle};
pub use timer::{schedule_once, TimerHandle};
pub use typing::TypingTracker;
