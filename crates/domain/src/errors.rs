//! Error types used throughout the application

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ConversationId, MessageId};

/// Main error type for Acolhe
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "message")]
pub enum AcolheError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Acolhe operations
pub type Result<T> = std::result::Result<T, AcolheError>;

/// Failure of one logical HTTP request after the retry envelope is spent.
///
/// Transport-level variants (`Connection`, `Cancelled`, `DeadlineExceeded`)
/// never reached a server response; the rest carry an application outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("server responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("request exceeded deadline of {deadline:?}")]
    DeadlineExceeded { deadline: Duration },
}

impl TransportError {
    /// True when no server response was involved.
    pub fn is_transport_level(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Cancelled | Self::DeadlineExceeded { .. })
    }

    /// HTTP status of an application-level failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Backlog load failure for one conversation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to load history for conversation {conversation_id}: {source}")]
pub struct HistoryError {
    pub conversation_id: ConversationId,
    #[source]
    pub source: TransportError,
}

impl HistoryError {
    pub fn new(conversation_id: ConversationId, source: TransportError) -> Self {
        Self { conversation_id, source }
    }

    /// Whether the load was abandoned because its session went away.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, TransportError::Cancelled)
    }
}

/// Push event that lacks fields required to become a [`crate::Message`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed live item: missing {}", missing.join(", "))]
pub struct MalformedLiveItem {
    pub missing: Vec<&'static str>,
}

/// The push subscription dropped or could not be opened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("live connection error: {reason}")]
pub struct LiveConnectionError {
    pub reason: String,
}

impl LiveConnectionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Consumer-facing chat error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    LiveConnection(#[from] LiveConnectionError),

    /// The server created the message but the push channel did not take it.
    #[error("message {message_id} was created but not delivered: {source}")]
    Undelivered {
        message_id: MessageId,
        #[source]
        source: LiveConnectionError,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ChatError {
    /// Recoverable errors leave the engine usable; the consumer may retry.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidInput(_))
    }
}

impl From<ChatError> for AcolheError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::InvalidInput(message) => Self::InvalidInput(message),
            ChatError::Transport(TransportError::Decode(message)) => Self::Serialization(message),
            other => Self::Network(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinguishes_transport_from_application_failures() {
        assert!(TransportError::Connection("refused".into()).is_transport_level());
        assert!(TransportError::Cancelled.is_transport_level());
        assert!(TransportError::DeadlineExceeded { deadline: Duration::from_secs(1) }
            .is_transport_level());

        let status = TransportError::Status { status: 503, body: String::new() };
        assert!(!status.is_transport_level());
        assert_eq!(status.status(), Some(503));
    }

    #[test]
    fn malformed_item_lists_missing_fields() {
        let err = MalformedLiveItem { missing: vec!["id", "sender_id"] };
        assert_eq!(err.to_string(), "malformed live item: missing id, sender_id");
    }

    #[test]
    fn history_error_reports_conversation_and_cause() {
        let err = HistoryError::new(
            ConversationId::from("C1"),
            TransportError::Status { status: 500, body: "boom".into() },
        );
        let rendered = err.to_string();
        assert!(rendered.contains("C1"));
        assert!(rendered.contains("500"));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn chat_error_maps_into_application_error() {
        let invalid: AcolheError = ChatError::InvalidInput("empty body".into()).into();
        assert_eq!(invalid, AcolheError::InvalidInput("empty body".into()));

        let network: AcolheError =
            ChatError::from(TransportError::Connection("reset".into())).into();
        assert!(matches!(network, AcolheError::Network(msg) if msg.contains("reset")));
    }
}
