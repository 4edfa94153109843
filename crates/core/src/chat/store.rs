//! Deduplicating, ordered message store
//!
//! One store per conversation session, owned by a single writer. Readers get
//! immutable [`MessageSnapshot`]s.

use std::collections::HashSet;

use acolhe_domain::{Message, MessageId, MessageSnapshot};

/// Merge-insert store ordered by `(created_at, id)`.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    cap: Option<usize>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the newest `cap` messages after each merge.
    pub fn with_cap(cap: usize) -> Self {
        Self { messages: Vec::new(), ids: HashSet::new(), cap: Some(cap) }
    }

    /// Insert every message whose id is unknown and restore display order.
    ///
    /// Returns how many messages were appended and are still retained.
    pub fn merge<I>(&mut self, incoming: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        let mut appended = Vec::new();
        for message in incoming {
            if self.ids.insert(message.id.clone()) {
                appended.push(message.id.clone());
                self.messages.push(message);
            }
        }

        if appended.is_empty() {
            return 0;
        }

        // Stable, so equal keys keep arrival order.
        self.messages.sort_by(Message::display_order);
        self.enforce_cap();

        appended.iter().filter(|id| self.ids.contains(*id)).count()
    }

    /// Current messages in display order.
    pub fn snapshot(&self) -> MessageSnapshot {
        MessageSnapshot::new(self.messages.clone())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    fn enforce_cap(&mut self) {
        let Some(cap) = self.cap else { return };
        if self.messages.len() <= cap {
            return;
        }
        let overflow = self.messages.len() - cap;
        for evicted in self.messages.drain(..overflow) {
            self.ids.remove(&evicted.id);
        }
    }
}
