//! In-process push hub
//!
//! One `tokio::sync::broadcast` topic per conversation. Used when sender and
//! readers share a process, and by tests to drive live delivery.

use std::collections::HashMap;

use acolhe_core::{PushChannel, PushStream};
use acolhe_domain::constants::DEFAULT_LIVE_BUFFER;
use acolhe_domain::{ConversationId, LiveConnectionError, LiveItem, Message};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

type TopicItem = Result<LiveItem, LiveConnectionError>;

pub struct BroadcastPushChannel {
    topics: Mutex<HashMap<ConversationId, broadcast::Sender<TopicItem>>>,
    capacity: usize,
}

impl Default for BroadcastPushChannel {
    fn default() -> Self {
        Self::new(DEFAULT_LIVE_BUFFER)
    }
}

impl BroadcastPushChannel {
    /// `capacity` is the per-topic backlog; a reader further behind than
    /// that sees a connection error.
    pub fn new(capacity: usize) -> Self {
        Self { topics: Mutex::new(HashMap::new()), capacity: capacity.max(1) }
    }

    /// Deliver a raw item to current subscribers. Returns how many received it.
    pub fn inject(&self, conversation_id: &ConversationId, item: LiveItem) -> usize {
        self.send(conversation_id, Ok(item))
    }

    /// Drop every subscription to `conversation_id`, as a network cut would.
    pub fn disconnect(&self, conversation_id: &ConversationId) {
        if self.topics.lock().remove(conversation_id).is_some() {
            debug!(conversation_id = %conversation_id, "Push topic disconnected");
        }
    }

    pub fn subscriber_count(&self, conversation_id: &ConversationId) -> usize {
        let mut topics = self.topics.lock();
        let count = topics.get(conversation_id).map_or(0, broadcast::Sender::receiver_count);
        if count == 0 {
            topics.remove(conversation_id);
        }
        count
    }

    /// Conversations that currently have a topic.
    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }

    fn send(&self, conversation_id: &ConversationId, item: TopicItem) -> usize {
        let mut topics = self.topics.lock();
        let Some(topic) = topics.get(conversation_id) else {
            return 0;
        };
        match topic.send(item) {
            Ok(receivers) => receivers,
            Err(_) => {
                // Every receiver is gone
                topics.remove(conversation_id);
                0
            }
        }
    }
}

#[async_trait]
impl PushChannel for BroadcastPushChannel {
    async fn open(&self, conversation_id: &ConversationId) -> Result<PushStream, LiveConnectionError> {
        let receiver = {
            let mut topics = self.topics.lock();
            // Topics whose readers all left are dropped here
            let before = topics.len();
            topics.retain(|_, topic| topic.receiver_count() > 0);
            if topics.len() < before {
                debug!(pruned = before - topics.len(), "Pruned idle push topics");
            }
            topics
                .entry(conversation_id.clone())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let stream = futures::stream::unfold(Some(receiver), |state| async move {
            let mut receiver = state?;
            match receiver.recv().await {
                Ok(item) => Some((item, Some(receiver))),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Push subscriber lagged behind");
                    let error = LiveConnectionError::new(format!("subscriber lagged by {skipped} events"));
                    Some((Err(error), None))
                }
                Err(RecvError::Closed) => None,
            }
        });
        Ok(stream.boxed())
    }

    async fn publish(&self, message: &Message) -> Result<(), LiveConnectionError> {
        let delivered = self.send(&message.conversation_id, Ok(LiveItem::from(message.clone())));
        debug!(message_id = %message.id, delivered, "Message published");
        Ok(())
    }
}
