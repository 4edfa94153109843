//! Chat messages, conversations and reader snapshots

use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ChatError;
use crate::impl_string_id;

impl_string_id!(
    /// Source-assigned message identity, unique within a conversation.
    MessageId
);
impl_string_id!(
    /// Opaque conversation identity.
    ConversationId
);
impl_string_id!(
    /// Opaque participant identity.
    UserId
);
impl_string_id!(
    /// Reference to an uploaded media object.
    MediaRef
);

impl MessageId {
    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

/// Numeric ids compare numerically, anything else lexicographically.
/// Numeric ids sort before non-numeric ones.
impl Ord for MessageId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for MessageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A chat message as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
}

impl Message {
    /// Display order: timestamp first, id as tie-break.
    pub fn display_order(&self, other: &Self) -> Ordering {
        self.created_at.cmp(&other.created_at).then_with(|| self.id.cmp(&other.id))
    }
}

/// Payload for creating a message; the server assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
}

impl OutgoingMessage {
    /// Build a text message, rejecting blank bodies and ids.
    pub fn new(
        conversation_id: ConversationId,
        sender_id: UserId,
        body: impl Into<String>,
    ) -> Result<Self, ChatError> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(ChatError::InvalidInput("message body must not be empty".into()));
        }
        if conversation_id.is_blank() {
            return Err(ChatError::InvalidInput("conversation id must not be empty".into()));
        }
        if sender_id.is_blank() {
            return Err(ChatError::InvalidInput("sender id must not be empty".into()));
        }
        Ok(Self { conversation_id, sender_id, body, media: None })
    }

    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media = Some(media);
        self
    }
}

/// A conversation between participants. Created by the matching flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default)]
    pub participants: HashSet<UserId>,
}

impl Conversation {
    pub fn new(id: ConversationId, participants: impl IntoIterator<Item = UserId>) -> Self {
        Self { id, participants: participants.into_iter().collect() }
    }

    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }

    /// Draft a message from one of the participants.
    pub fn draft(&self, sender: &UserId, body: impl Into<String>) -> Result<OutgoingMessage, ChatError> {
        if !self.has_participant(sender) {
            return Err(ChatError::InvalidInput(format!(
                "{sender} is not a participant of conversation {}",
                self.id
            )));
        }
        OutgoingMessage::new(self.id.clone(), sender.clone(), body)
    }
}

/// Immutable, cheaply cloneable view of a conversation's ordered messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSnapshot(Arc<[Message]>);

impl MessageSnapshot {
    pub fn new(messages: Vec<Message>) -> Self {
        Self(Arc::from(messages))
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    /// Message ids in display order.
    pub fn ids(&self) -> Vec<&str> {
        self.0.iter().map(|message| message.id.as_str()).collect()
    }
}

impl Default for MessageSnapshot {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Deref for MessageSnapshot {
    type Target = [Message];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
