//! Raw push-channel payloads
//!
//! Push events arrive from a channel we do not control, so every field is
//! optional until [`LiveItem::into_message`] validates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::MalformedLiveItem;
use crate::types::chat::{ConversationId, MediaRef, Message, MessageId, UserId};

/// A message-shaped event as delivered by a push channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveItem {
    #[serde(default)]
    pub id: Option<MessageId>,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub sender_id: Option<UserId>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaRef>,
}

impl LiveItem {
    /// Validate structural completeness.
    ///
    /// `id`, `conversation_id` and `sender_id` are required; a missing body
    /// becomes empty and a missing timestamp becomes `received_at`.
    pub fn into_message(self, received_at: DateTime<Utc>) -> Result<Message, MalformedLiveItem> {
        let mut missing = Vec::new();
        let id = self.id.filter(|id| !id.is_blank());
        let conversation_id = self.conversation_id.filter(|id| !id.is_blank());
        let sender_id = self.sender_id.filter(|id| !id.is_blank());

        if id.is_none() {
            missing.push("id");
        }
        if conversation_id.is_none() {
            missing.push("conversation_id");
        }
        if sender_id.is_none() {
            missing.push("sender_id");
        }

        match (id, conversation_id, sender_id) {
            (Some(id), Some(conversation_id), Some(sender_id)) => Ok(Message {
                id,
                conversation_id,
                sender_id,
                body: self.body.unwrap_or_default(),
                created_at: self.created_at.unwrap_or(received_at),
                media: self.media,
            }),
            _ => Err(MalformedLiveItem { missing }),
        }
    }
}

impl From<Message> for LiveItem {
    fn from(message: Message) -> Self {
        Self {
            id: Some(message.id),
            conversation_id: Some(message.conversation_id),
            sender_id: Some(message.sender_id),
            body: Some(message.body),
            created_at: Some(message.created_at),
            media: message.media,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn received_at() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    #[test]
    fn complete_item_becomes_message() {
        let item = LiveItem {
            id: Some("7".into()),
            conversation_id: Some("C1".into()),
            sender_id: Some("u1".into()),
            body: Some("hello".into()),
            created_at: Some(Utc.timestamp_millis_opt(5).unwrap()),
            media: None,
        };

        let message = item.into_message(received_at()).unwrap();
        assert_eq!(message.id.as_str(), "7");
        assert_eq!(message.created_at, Utc.timestamp_millis_opt(5).unwrap());
    }

    #[test]
    fn defaults_body_and_timestamp() {
        let item = LiveItem {
            id: Some("7".into()),
            conversation_id: Some("C1".into()),
            sender_id: Some("u1".into()),
            ..LiveItem::default()
        };

        let message = item.into_message(received_at()).unwrap();
        assert_eq!(message.body, "");
        assert_eq!(message.created_at, received_at());
    }

    #[test]
    fn reports_every_missing_field() {
        let item = LiveItem { body: Some("orphan".into()), ..LiveItem::default() };
        let err = item.into_message(received_at()).unwrap_err();
        assert_eq!(err.missing, vec!["id", "conversation_id", "sender_id"]);
    }

    #[test]
    fn blank_ids_count_as_missing() {
        let item = LiveItem {
            id: Some(" ".into()),
            conversation_id: Some("C1".into()),
            sender_id: Some("u1".into()),
            ..LiveItem::default()
        };
        let err = item.into_message(received_at()).unwrap_err();
        assert_eq!(err.missing, vec!["id"]);
    }

    #[test]
    fn parses_sparse_json_payload() {
        let item: LiveItem = serde_json::from_str(r#"{"id":"1","body":"x"}"#).unwrap();
        assert_eq!(item.id, Some(MessageId::from("1")));
        assert_eq!(item.sender_id, None);
    }

    #[test]
    fn integer_ids_become_strings() {
        let item: LiveItem =
            serde_json::from_str(r#"{"id":3,"conversation_id":7,"sender_id":2,"body":"oi"}"#)
                .unwrap();
        let message = item.into_message(received_at()).unwrap();
        assert_eq!(message.id, MessageId::from("3"));
        assert_eq!(message.conversation_id, ConversationId::from("7"));
        assert_eq!(message.sender_id, UserId::from("2"));
    }
}
