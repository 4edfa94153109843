//! Chat synchronization engine
//!
//! Coordinates history, live subscription and the message store for one
//! conversation at a time. A single session task owns the store and applies
//! every merge; consumers observe state and snapshots through a `watch`
//! channel (current values) and a `broadcast` channel (ordered event log).
//!
//! ## State machine
//! ```text
//! Idle --start--> Loading --history ok--> Listening --live exhausted--> Degraded
//!                    |
//!                    +--history failed--> Error
//! any --stop--> Idle
//! ```

use std::sync::Arc;
use std::time::Duration;

use acolhe_common::join_with_timeout;
use acolhe_domain::constants::{DEFAULT_EVENT_BUFFER, DEFAULT_JOIN_TIMEOUT_MS};
use acolhe_domain::{
    ChatError, ConversationId, LiveConfig, Message, MessageSnapshot, OutgoingMessage, SyncState,
    UserId,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::live::{LiveEvent, LiveSource};
use super::ports::{HistorySource, MessageGateway};
use super::store::MessageStore;

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSyncConfig {
    /// Capacity of the broadcast event log per subscriber.
    pub event_buffer: usize,
    /// How long `stop` waits for the session task.
    pub join_timeout: Duration,
    /// Optional cap on messages kept per session.
    pub max_messages: Option<usize>,
}

impl Default for ChatSyncConfig {
    fn default() -> Self {
        Self {
            event_buffer: DEFAULT_EVENT_BUFFER,
            join_timeout: Duration::from_millis(DEFAULT_JOIN_TIMEOUT_MS),
            max_messages: None,
        }
    }
}

impl From<&LiveConfig> for ChatSyncConfig {
    fn from(config: &LiveConfig) -> Self {
        Self {
            event_buffer: config.event_buffer.max(1),
            join_timeout: config.join_timeout(),
            max_messages: None,
        }
    }
}

/// Ordered notifications for consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    StateChanged(SyncState),
    Snapshot(MessageSnapshot),
    Error(ChatError),
}

/// Current observable values of an engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub state: SyncState,
    pub conversation_id: Option<ConversationId>,
    pub snapshot: MessageSnapshot,
    pub last_error: Option<ChatError>,
}

/// Fan-out of state, snapshots and errors.
///
/// Session updates are accepted only while their session is the active one,
/// so a stopped session can never publish late.
struct Publisher {
    status: watch::Sender<SyncStatus>,
    events: broadcast::Sender<SyncEvent>,
    active: Mutex<Option<u64>>,
}

impl Publisher {
    fn new(event_buffer: usize) -> (Self, watch::Receiver<SyncStatus>) {
        let (status, status_rx) = watch::channel(SyncStatus::default());
        let (events, _) = broadcast::channel(event_buffer.max(1));
        (Self { status, events, active: Mutex::new(None) }, status_rx)
    }

    fn begin(&self, session: u64, conversation_id: ConversationId) {
        let mut active = self.active.lock();
        *active = Some(session);
        self.status.send_modify(|status| {
            status.conversation_id = Some(conversation_id);
            status.last_error = None;
        });
        self.set_state(SyncState::Loading);
    }

    /// Stop accepting updates from the current session.
    fn deactivate(&self) {
        *self.active.lock() = None;
    }

    /// Run `update` only if `session` is still active.
    fn for_session(&self, session: u64, update: impl FnOnce(&Self)) -> bool {
        let active = self.active.lock();
        if *active != Some(session) {
            return false;
        }
        update(self);
        true
    }

    fn set_state(&self, state: SyncState) {
        let changed = self.status.send_if_modified(|status| {
            if status.state == state {
                return false;
            }
            status.state = state;
            true
        });
        if changed {
            debug!(%state, "Sync state changed");
            let _ = self.events.send(SyncEvent::StateChanged(state));
        }
    }

    fn publish_snapshot(&self, snapshot: MessageSnapshot) {
        self.status.send_modify(|status| status.snapshot = snapshot.clone());
        let _ = self.events.send(SyncEvent::Snapshot(snapshot));
    }

    fn publish_error(&self, error: ChatError) {
        self.status.send_modify(|status| status.last_error = Some(error.clone()));
        let _ = self.events.send(SyncEvent::Error(error));
    }
}

struct Session {
    id: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Keeps one conversation's messages current and sends new ones.
pub struct ChatSyncEngine {
    history: Arc<dyn HistorySource>,
    gateway: Arc<dyn MessageGateway>,
    live: LiveSource,
    publisher: Arc<Publisher>,
    status_rx: watch::Receiver<SyncStatus>,
    config: ChatSyncConfig,
    session: Option<Session>,
    next_session: u64,
}

impl ChatSyncEngine {
    pub fn new(
        history: Arc<dyn HistorySource>,
        gateway: Arc<dyn MessageGateway>,
        live: LiveSource,
        config: ChatSyncConfig,
    ) -> Self {
        let (publisher, status_rx) = Publisher::new(config.event_buffer);
        Self {
            history,
            gateway,
            live,
            publisher: Arc::new(publisher),
            status_rx,
            config,
            session: None,
            next_session: 0,
        }
    }

    /// Begin synchronizing `conversation_id`, stopping any active session.
    ///
    /// Returns once the engine is `Loading`; progress is observable through
    /// [`Self::state`], [`Self::watch`] and [`Self::subscribe`].
    ///
    /// # Errors
    /// `ChatError::InvalidInput` for a blank conversation id.
    #[instrument(skip(self, conversation_id), fields(conversation_id = %conversation_id))]
    pub async fn start(&mut self, conversation_id: ConversationId) -> Result<(), ChatError> {
        if conversation_id.is_blank() {
            return Err(ChatError::InvalidInput("conversation id must not be empty".into()));
        }

        self.stop().await;

        self.next_session += 1;
        let id = self.next_session;
        let cancel = CancellationToken::new();
        self.publisher.begin(id, conversation_id.clone());

        let session = SessionTask {
            id,
            conversation_id,
            history: Arc::clone(&self.history),
            live: self.live.clone(),
            publisher: Arc::clone(&self.publisher),
            cancel: cancel.clone(),
            max_messages: self.config.max_messages,
        };
        let task = tokio::spawn(session.run());
        self.session = Some(Session { id, cancel, task });

        info!("Chat session started");
        Ok(())
    }

    /// Cancel the live subscription and any in-flight history load, then go
    /// `Idle`. Safe to call in any state.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            self.publisher.set_state(SyncState::Idle);
            return;
        };

        // Deactivate before cancelling so nothing from this session lands.
        self.publisher.deactivate();
        session.cancel.cancel();

        let join_timeout = self.config.join_timeout;
        if let Err(err) = join_with_timeout("chat-session", session.task, join_timeout).await {
            warn!(session = session.id, error = %err, "Chat session did not stop cleanly");
        }
        self.publisher.set_state(SyncState::Idle);
        info!(session = session.id, "Chat session stopped");
    }

    /// Validate, create and fan out a new message.
    ///
    /// The message reaches the local snapshot through the live channel, not
    /// directly.
    ///
    /// # Errors
    /// - `InvalidInput` for a blank body or id, before any I/O
    /// - `Transport` when the backend rejected or never saw the message
    /// - `Undelivered` when the message was created but not published
    #[instrument(skip(self, body))]
    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        body: &str,
    ) -> Result<Message, ChatError> {
        let outgoing = OutgoingMessage::new(conversation_id.clone(), sender_id.clone(), body)?;
        self.send(outgoing).await
    }

    /// Send a prepared message (for example one carrying media).
    ///
    /// # Errors
    /// See [`Self::send_message`].
    pub async fn send(&self, outgoing: OutgoingMessage) -> Result<Message, ChatError> {
        if outgoing.body.trim().is_empty() {
            return Err(ChatError::InvalidInput("message body must not be empty".into()));
        }

        let created = self.gateway.create_message(&outgoing).await?;
        debug!(message_id = %created.id, "Message created");

        self.live.channel().publish(&created).await.map_err(|source| {
            warn!(message_id = %created.id, error = %source, "Created message was not published");
            ChatError::Undelivered { message_id: created.id.clone(), source }
        })?;
        Ok(created)
    }

    pub fn state(&self) -> SyncState {
        self.status_rx.borrow().state
    }

    pub fn snapshot(&self) -> MessageSnapshot {
        self.status_rx.borrow().snapshot.clone()
    }

    pub fn last_error(&self) -> Option<ChatError> {
        self.status_rx.borrow().last_error.clone()
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.status_rx.borrow().conversation_id.clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.status_rx.borrow().clone()
    }

    /// Receiver for current values; only the latest value is retained.
    pub fn watch(&self) -> watch::Receiver<SyncStatus> {
        self.status_rx.clone()
    }

    /// Receiver for every state change, snapshot and error from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.publisher.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }
}

impl Drop for ChatSyncEngine {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.cancel.cancel();
        }
    }
}

/// Everything the session task owns
struct SessionTask {
    id: u64,
    conversation_id: ConversationId,
    history: Arc<dyn HistorySource>,
    live: LiveSource,
    publisher: Arc<Publisher>,
    cancel: CancellationToken,
    max_messages: Option<usize>,
}

impl SessionTask {
    async fn run(self) {
        let fetched = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return,
            fetched = self.history.fetch(&self.conversation_id) => fetched,
        };

        let backlog = match fetched {
            Ok(backlog) => backlog,
            Err(err) => {
                warn!(conversation_id = %self.conversation_id, error = %err, "History load failed");
                self.publisher.for_session(self.id, |publisher| {
                    publisher.publish_error(ChatError::History(err));
                    publisher.set_state(SyncState::Error);
                });
                return;
            }
        };

        let mut store = match self.max_messages {
            Some(cap) => MessageStore::with_cap(cap),
            None => MessageStore::new(),
        };
        store.merge(backlog);
        let snapshot = store.snapshot();
        debug!(conversation_id = %self.conversation_id, messages = store.len(), "History merged");

        let published = self.publisher.for_session(self.id, |publisher| {
            publisher.publish_snapshot(snapshot);
        });
        if !published {
            return;
        }

        let mut subscription =
            self.live.subscribe_with_token(self.conversation_id.clone(), self.cancel.child_token());
        self.publisher.for_session(self.id, |publisher| publisher.set_state(SyncState::Listening));

        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                event = subscription.next() => event,
            };

            match event {
                Some(LiveEvent::Message(message)) => {
                    self.merge_and_publish(&mut store, [message]);
                }
                Some(LiveEvent::Resubscribed) => {
                    if !self.catch_up(&mut store).await {
                        break;
                    }
                }
                Some(LiveEvent::Degraded(err)) => {
                    warn!(conversation_id = %self.conversation_id, error = %err, "Live updates degraded");
                    self.publisher.for_session(self.id, |publisher| {
                        publisher.publish_error(ChatError::LiveConnection(err));
                        publisher.set_state(SyncState::Degraded);
                    });
                }
                None => break,
            }
        }

        subscription.cancel();
    }

    fn merge_and_publish<I>(&self, store: &mut MessageStore, incoming: I)
    where
        I: IntoIterator<Item = Message>,
    {
        if store.merge(incoming) > 0 {
            let snapshot = store.snapshot();
            self.publisher.for_session(self.id, |publisher| publisher.publish_snapshot(snapshot));
        }
    }

    /// Refetch history after a reconnect. Returns false when cancelled.
    async fn catch_up(&self, store: &mut MessageStore) -> bool {
        let fetched = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return false,
            fetched = self.history.fetch(&self.conversation_id) => fetched,
        };
        match fetched {
            Ok(backlog) => self.merge_and_publish(store, backlog),
            Err(err) => {
                warn!(conversation_id = %self.conversation_id, error = %err, "Catch-up fetch failed");
            }
        }
        true
    }
}
