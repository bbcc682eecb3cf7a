//! The synchronization engine: one logical update thread.
//!
//! [`SyncEngine::run`] is a select loop over two inputs: typed events from
//! the [`EventRouter`] and [`EngineCommand`]s from the application (user
//! intents) and from expired timers (autosave, typing auto-stop). All domain
//! state mutation happens inside this loop, in arrival order, so the
//! reconcilers need no locking.
//!
//! Timer callbacks never touch state directly; they post a command back
//! into the loop. Dropping a reconciler disarms its timers, so a stale
//! callback can at worst post a command that finds no open chat and is
//! ignored.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::api::{ChatsApi, MessagesApi, NotesApi};
use crate::chat_list::ChatList;
use crate::error::ApiError;
use crate::messages::MessageStream;
use crate::models::{Chat, User};
use crate::note::NoteSync;
use crate::protocol::ServerEvent;
use crate::router::EventRouter;
use crate::socket::SocketClient;

/// Inputs to the engine loop: user intents and timer expirations.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Connect,
    Disconnect,
    LoadChats,
    RefreshChats,
    CreateDirectChat { user_id: String },
    CreateGroupChat { name: String, participant_ids: Vec<String> },
    OpenChat(Box<Chat>),
    CloseChat,
    DraftChanged(String),
    SendMessage,
    NoteEdited(String),
    SaveNote,
    StopTypingChat,
    StopTypingNote,
    Shutdown,
}

/// Cloneable sender the application and timers use to reach the loop.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    pub fn send(&self, command: EngineCommand) {
        // A closed channel means the engine has shut down; late timer
        // callbacks land here and are dropped.
        if self.tx.send(command).is_err() {
            log::debug!("engine command dropped after shutdown");
        }
    }

    pub fn open_chat(&self, chat: Chat) {
        self.send(EngineCommand::OpenChat(Box::new(chat)));
    }

    pub fn shutdown(&self) {
        self.send(EngineCommand::Shutdown);
    }
}

/// Owns every reconciler plus the connection, and applies all mutations.
pub struct SyncEngine<A> {
    api: A,
    socket: Arc<SocketClient>,
    router: Arc<EventRouter>,
    current_user: User,
    chat_list: ChatList<A>,
    stream: Option<MessageStream<A>>,
    note: Option<NoteSync<A>>,
    commands_tx: mpsc::UnboundedSender<EngineCommand>,
    commands_rx: mpsc::UnboundedReceiver<EngineCommand>,
    signed_out: bool,
}

impl<A> SyncEngine<A>
where
    A: ChatsApi + MessagesApi + NotesApi + Clone,
{
    pub fn new(
        api: A,
        socket: Arc<SocketClient>,
        router: Arc<EventRouter>,
        current_user: User,
    ) -> (Self, EngineHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let chat_list = ChatList::new(
            api.clone(),
            socket.handle(),
            Some(current_user.id.clone()),
        );
        let engine = Self {
            api,
            socket,
            router,
            current_user,
            chat_list,
            stream: None,
            note: None,
            commands_tx: commands_tx.clone(),
            commands_rx,
            signed_out: false,
        };
        (engine, EngineHandle { tx: commands_tx })
    }

    /// Run until `Shutdown` (or until every command sender is dropped).
    pub async fn run(&mut self) {
        let mut events = self.router.subscribe();
        loop {
            tokio::select! {
                command = self.commands_rx.recv() => match command {
                    None | Some(EngineCommand::Shutdown) => break,
                    Some(command) => self.apply_command(command).await,
                },
                event = events.recv() => match event {
                    Ok(event) => self.apply_event(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("engine lagged behind event stream by {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        self.teardown();
    }

    /// Apply one command. Public so tests can drive the engine without the
    /// loop.
    pub async fn apply_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Connect => self.socket.connect().await,
            EngineCommand::Disconnect => self.socket.disconnect(),
            EngineCommand::LoadChats => {
                let result = self.chat_list.load().await;
                self.check_auth(result);
            }
            EngineCommand::RefreshChats => {
                let result = self.chat_list.refresh().await;
                self.check_auth(result);
            }
            EngineCommand::CreateDirectChat { user_id } => {
                let result = self.chat_list.create_direct_chat(&user_id).await;
                self.check_auth(result);
            }
            EngineCommand::CreateGroupChat { name, participant_ids } => {
                let result = self.chat_list.create_group_chat(&name, participant_ids).await;
                self.check_auth(result);
            }
            EngineCommand::OpenChat(chat) => self.open_chat(*chat).await,
            EngineCommand::CloseChat => self.close_chat(),
            EngineCommand::DraftChanged(text) => {
                let handle = self.handle();
                if let Some(stream) = &mut self.stream {
                    stream.draft_changed(text, move || {
                        handle.send(EngineCommand::StopTypingChat);
                    });
                }
            }
            EngineCommand::SendMessage => {
                let result = match &mut self.stream {
                    Some(stream) => stream.send().await,
                    None => Ok(()),
                };
                self.check_auth(result);
            }
            EngineCommand::NoteEdited(content) => {
                let save = self.handle();
                let idle = self.handle();
                if let Some(note) = &mut self.note {
                    note.edited(
                        content,
                        move || save.send(EngineCommand::SaveNote),
                        move || idle.send(EngineCommand::StopTypingNote),
                    );
                }
            }
            EngineCommand::SaveNote => {
                let result = match &mut self.note {
                    Some(note) => note.save().await,
                    None => Ok(()),
                };
                self.check_auth(result);
            }
            EngineCommand::StopTypingChat => {
                if let Some(stream) = &mut self.stream {
                    stream.stop_typing();
                }
            }
            EngineCommand::StopTypingNote => {
                if let Some(note) = &mut self.note {
                    note.stop_typing();
                }
            }
            EngineCommand::Shutdown => {} // handled by the loop
        }
    }

    /// Apply one routed event to the reconcilers that care about it.
    pub fn apply_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage(message) => {
                self.chat_list.apply_new_message(&message);
                if let Some(stream) = &mut self.stream {
                    stream.apply_new_message(message);
                }
            }
            ServerEvent::UserPresence { user, online } => {
                self.chat_list.apply_presence(&user, online);
            }
            ServerEvent::TypingInChat { chat_id, user, is_typing } => {
                if let Some(stream) = &mut self.stream {
                    if stream.chat_id() == chat_id {
                        stream.apply_typing(user, is_typing);
                    }
                }
            }
            ServerEvent::NoteUpdated(note) => {
                if let Some(sync) = &mut self.note {
                    sync.apply_remote_update(note);
                }
            }
            ServerEvent::TypingInNote { chat_id, user, is_typing } => {
                if let Some(sync) = &mut self.note {
                    if sync.chat_id() == chat_id {
                        sync.apply_typing(user, is_typing);
                    }
                }
            }
            ServerEvent::Connected => log::info!("push connection established"),
            ServerEvent::Disconnected => log::warn!("push connection lost"),
        }
    }

    async fn open_chat(&mut self, chat: Chat) {
        self.close_chat();
        let mut stream = MessageStream::new(
            self.api.clone(),
            self.socket.handle(),
            chat.id.clone(),
            self.current_user.id.clone(),
            chat.is_group,
        );
        let mut note = NoteSync::new(
            self.api.clone(),
            self.socket.handle(),
            chat.id.clone(),
            self.current_user.id.clone(),
        );
        let history = stream.load_history().await;
        let loaded = note.load().await;
        self.stream = Some(stream);
        self.note = Some(note);
        self.check_auth(history);
        self.check_auth(loaded);
    }

    fn close_chat(&mut self) {
        if let Some(stream) = &mut self.stream {
            stream.stop_typing();
        }
        if let Some(note) = &mut self.note {
            note.teardown();
        }
        self.stream = None;
        self.note = None;
    }

    /// A 401 anywhere forces a global sign-out: connection teardown and
    /// cleared domain state. The token store was already cleared by the
    /// transport.
    fn check_auth<T>(&mut self, result: Result<T, ApiError>) {
        if matches!(&result, Err(err) if err.is_unauthorized()) {
            log::warn!("unauthorized response; signing out");
            self.close_chat();
            self.chat_list.clear();
            self.socket.disconnect();
            self.signed_out = true;
        }
    }

    /// Final teardown: disarm every timer and drop the connection, but keep
    /// reconciler state readable for whoever still owns the engine.
    fn teardown(&mut self) {
        if let Some(stream) = &mut self.stream {
            stream.stop_typing();
        }
        if let Some(note) = &mut self.note {
            note.teardown();
        }
        self.socket.disconnect();
    }

    fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.commands_tx.clone(),
        }
    }

    pub fn chat_list(&self) -> &ChatList<A> {
        &self.chat_list
    }

    pub fn stream(&self) -> Option<&MessageStream<A>> {
        self.stream.as_ref()
    }

    pub fn stream_mut(&mut self) -> Option<&mut MessageStream<A>> {
        self.stream.as_mut()
    }

    pub fn note(&self) -> Option<&NoteSync<A>> {
        self.note.as_ref()
    }

    pub fn note_mut(&mut self) -> Option<&mut NoteSync<A>> {
        self.note.as_mut()
    }

    pub fn is_signed_out(&self) -> bool {
        self.signed_out
    }
}
