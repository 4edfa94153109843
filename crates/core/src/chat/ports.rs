//! Port interfaces for chat synchronization

use acolhe_domain::{
    ConversationId, HistoryError, LiveConnectionError, LiveItem, Message, OutgoingMessage,
    TransportError,
};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Raw push events for one conversation. Dropping the stream unsubscribes.
pub type PushStream = BoxStream<'static, Result<LiveItem, LiveConnectionError>>;

/// Loads the persisted backlog of a conversation
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch the whole backlog as one batch.
    ///
    /// Dropping the returned future abandons the request, including any
    /// backoff wait in progress.
    async fn fetch(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, HistoryError>;
}

/// Creates messages on the backend
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Persist a message and return it with its server-assigned id.
    async fn create_message(&self, message: &OutgoingMessage) -> Result<Message, TransportError>;
}

/// Server-initiated delivery of new messages
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Subscribe to a conversation's live events.
    async fn open(&self, conversation_id: &ConversationId) -> Result<PushStream, LiveConnectionError>;

    /// Fan a created message out to every subscriber of its conversation.
    async fn publish(&self, message: &Message) -> Result<(), LiveConnectionError>;
}
