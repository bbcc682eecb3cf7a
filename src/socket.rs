//! Push connection lifecycle and outbound intents.
//!
//! [`SocketClient`] owns the single persistent websocket: it authenticates
//! the handshake with the stored token, reports connectivity, and forwards
//! every inbound frame to the [`EventRouter`]. A failed connect settles into
//! `Disconnected` with a recorded connection error rather than returning an
//! error to the caller.
//!
//! Joined chat rooms are remembered across reconnects: membership is not
//! implicit on the server side, so after every successful (re)connection the
//! full set of joined chat ids is re-announced once, before the reader task
//! starts pumping inbound events.
//!
//! Outbound intents are fire-and-forget; the durable path for a chat message
//! is the paired HTTP create call.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use crate::auth::TokenStore;
use crate::protocol::{outbound, Frame, ServerEvent};
use crate::router::EventRouter;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Shared outbound channel slot; `None` while disconnected.
type OutgoingSlot = Arc<RwLock<Option<mpsc::Sender<Frame>>>>;

/// The push connection manager.
pub struct SocketClient {
    url: String,
    tokens: Arc<dyn TokenStore>,
    router: Arc<EventRouter>,
    state: Arc<RwLock<ConnectionState>>,
    connection_error: Arc<RwLock<Option<String>>>,
    joined: Arc<Mutex<BTreeSet<String>>>,
    outgoing: OutgoingSlot,
    /// Bumped on every connect/disconnect so tasks from a previous
    /// connection cannot flip the state of the current one.
    generation: Arc<AtomicU64>,
    /// Writer and reader tasks of the live connection; aborted on teardown
    /// so the stream is actually severed, not just starved of output.
    tasks: Arc<Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>>,
}

impl SocketClient {
    pub fn new(url: impl Into<String>, tokens: Arc<dyn TokenStore>, router: Arc<EventRouter>) -> Self {
        Self {
            url: url.into(),
            tokens,
            router,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connection_error: Arc::new(RwLock::new(None)),
            joined: Arc::new(Mutex::new(BTreeSet::new())),
            outgoing: Arc::new(RwLock::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            tasks: Arc::new(Mutex::new(None)),
        }
    }

    /// Handshake URL with the token as a query parameter. Parsing through
    /// [`Url`] normalizes a bare authority to a `/` path, which a raw string
    /// concatenation would not; a path-less request line is rejected by the
    /// server as malformed HTTP.
    fn handshake_url(base: &str, token: &str) -> Option<Url> {
        let mut url = Url::parse(base).ok()?;
        url.query_pairs_mut().append_pair("token", token);
        Some(url)
    }

    /// Establish the connection. Never returns an error: a missing token or
    /// unreachable endpoint records a connection error and leaves the client
    /// `Disconnected`.
    pub async fn connect(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(ConnectionState::Connecting);

        let token = match self.tokens.token() {
            Some(token) if !token.is_empty() => token,
            _ => {
                self.settle_error("No authentication token");
                return;
            }
        };

        let Some(url) = Self::handshake_url(&self.url, &token) else {
            self.settle_error("Invalid socket URL");
            return;
        };
        let mut request = match url.as_str().into_client_request() {
            Ok(request) => request,
            Err(_) => {
                self.settle_error("Invalid socket URL");
                return;
            }
        };
        if let Ok(value) = format!("Bearer {token}").parse() {
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let ws_stream = match tokio_tungstenite::connect_async(request).await {
            Ok((stream, _)) => stream,
            Err(err) => {
                self.settle_error(format!("Connection error: {err}"));
                return;
            }
        };
        // A disconnect that raced the handshake wins; drop the fresh stream.
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Frame>(256);

        // Writer task: drain the outbound channel onto the socket.
        let writer_task = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match frame.encode() {
                    Ok(text) => text,
                    Err(err) => {
                        log::warn!("failed to encode outbound frame: {err}");
                        continue;
                    }
                };
                if ws_writer.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        if self.generation.load(Ordering::SeqCst) != generation {
            writer_task.abort();
            return;
        }
        if let Ok(mut slot) = self.outgoing.write() {
            *slot = Some(out_tx.clone());
        }
        self.set_state(ConnectionState::Connected);
        if let Ok(mut err) = self.connection_error.write() {
            *err = None;
        }
        self.router.publish(ServerEvent::Connected);

        // Re-announce room membership before any inbound event is consumed;
        // the server does not remember joins across connections.
        let joined: Vec<String> = match self.joined.lock() {
            Ok(set) => set.iter().cloned().collect(),
            Err(_) => Vec::new(),
        };
        if !joined.is_empty() {
            log::info!("re-announcing {} joined chats", joined.len());
            let _ = out_tx.send(outbound::join_chats(&joined)).await;
        }

        if self.generation.load(Ordering::SeqCst) != generation {
            writer_task.abort();
            return;
        }

        // Reader task: pump frames into the router until the socket closes
        // or the connection is superseded.
        let router = Arc::clone(&self.router);
        let state = Arc::clone(&self.state);
        let outgoing = Arc::clone(&self.outgoing);
        let gen_counter = Arc::clone(&self.generation);
        let reader_task = tokio::spawn(async move {
            while let Some(message) = ws_reader.next().await {
                if gen_counter.load(Ordering::SeqCst) != generation {
                    return;
                }
                match message {
                    Ok(WsMessage::Text(text)) => router.route_text(text.as_str()),
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            // Only the current connection may mark the client disconnected.
            if gen_counter.load(Ordering::SeqCst) == generation {
                if let Ok(mut s) = state.write() {
                    *s = ConnectionState::Disconnected;
                }
                if let Ok(mut slot) = outgoing.write() {
                    *slot = None;
                }
                router.publish(ServerEvent::Disconnected);
            }
        });

        if let Ok(mut slot) = self.tasks.lock() {
            if let Some((writer, reader)) = slot.replace((writer_task, reader_task)) {
                writer.abort();
                reader.abort();
            }
        }
    }

    /// Tear down the connection and clear all engagement. Idempotent.
    ///
    /// Aborting the reader and writer tasks drops both stream halves, which
    /// closes the underlying socket; starving the writer alone would leave
    /// the server feeding a connection nobody is listening to.
    pub fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut slot) = self.tasks.lock() {
            if let Some((writer, reader)) = slot.take() {
                writer.abort();
                reader.abort();
            }
        }
        if let Ok(mut slot) = self.outgoing.write() {
            *slot = None;
        }
        if let Ok(mut set) = self.joined.lock() {
            set.clear();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn connection_error(&self) -> Option<String> {
        self.connection_error.read().ok().and_then(|e| e.clone())
    }

    /// Cheap cloneable emitter for reconcilers.
    pub fn handle(&self) -> SocketHandle {
        SocketHandle {
            outgoing: Arc::clone(&self.outgoing),
            joined: Arc::clone(&self.joined),
        }
    }

    fn set_state(&self, new: ConnectionState) {
        if let Ok(mut s) = self.state.write() {
            *s = new;
        }
    }

    fn settle_error(&self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("socket connect failed: {message}");
        if let Ok(mut err) = self.connection_error.write() {
            *err = Some(message);
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

/// Fire-and-forget emitter over the push connection.
///
/// Emits are dropped (with a debug log) while disconnected; none of them is
/// a durable delivery path.
#[derive(Clone)]
pub struct SocketHandle {
    outgoing: OutgoingSlot,
    joined: Arc<Mutex<BTreeSet<String>>>,
}

impl SocketHandle {
    /// Announce membership of the given chat rooms and remember them for
    /// re-announcement after a reconnect.
    pub fn join_chats(&self, chat_ids: &[String]) {
        if chat_ids.is_empty() {
            return;
        }
        if let Ok(mut set) = self.joined.lock() {
            set.extend(chat_ids.iter().cloned());
        }
        self.emit(outbound::join_chats(chat_ids));
    }

    pub fn send_message(&self, chat_id: &str, content: &str) {
        self.emit(outbound::send_message(chat_id, content));
    }

    pub fn typing_message(&self, chat_id: &str, is_typing: bool) {
        self.emit(outbound::typing_message(chat_id, is_typing));
    }

    pub fn update_note(&self, chat_id: &str, content: &str, version: i64) {
        self.emit(outbound::update_note(chat_id, content, version));
    }

    pub fn typing_note(&self, chat_id: &str, is_typing: bool) {
        self.emit(outbound::typing_note(chat_id, is_typing));
    }

    /// Chat ids currently joined (sorted).
    pub fn joined_chats(&self) -> Vec<String> {
        self.joined
            .lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn emit(&self, frame: Frame) {
        let sender = match self.outgoing.read() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        match sender {
            Some(tx) => {
                if let Err(err) = tx.try_send(frame) {
                    log::debug!("outbound frame dropped: {err}");
                }
            }
            None => log::debug!("outbound frame dropped: not connected"),
        }
    }
}
