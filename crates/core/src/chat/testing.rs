//! In-memory port fakes for chat unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use acolhe_domain::{
    ConversationId, HistoryError, LiveConnectionError, LiveItem, Message, MessageId,
    OutgoingMessage, TransportError, UserId,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use super::ports::{HistorySource, MessageGateway, PushChannel, PushStream};

pub fn message(id: &str, millis: i64) -> Message {
    message_in("C1", id, millis)
}

pub fn message_in(conversation: &str, id: &str, millis: i64) -> Message {
    Message {
        id: MessageId::from(id),
        conversation_id: ConversationId::from(conversation),
        sender_id: UserId::from("u1"),
        body: format!("body {id}"),
        created_at: Utc.timestamp_millis_opt(millis).unwrap(),
        media: None,
    }
}

/// Scripted history responses; the last one repeats once the script runs out.
#[derive(Default)]
pub struct FakeHistory {
    responses: Mutex<VecDeque<Result<Vec<Message>, TransportError>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl FakeHistory {
    pub fn returning(messages: Vec<Message>) -> Self {
        Self { responses: Mutex::new(VecDeque::from([Ok(messages)])), ..Self::default() }
    }

    pub fn failing(error: TransportError) -> Self {
        Self { responses: Mutex::new(VecDeque::from([Err(error)])), ..Self::default() }
    }

    pub fn then(self, response: Result<Vec<Message>, TransportError>) -> Self {
        self.responses.lock().push_back(response);
        self
    }

    /// Block every fetch until the gate is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistorySource for FakeHistory {
    async fn fetch(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, HistoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let response = {
            let mut responses = self.responses.lock();
            if responses.len() > 1 {
                responses.pop_front()
            } else {
                responses.front().cloned()
            }
        };
        response
            .unwrap_or_else(|| Ok(Vec::new()))
            .map_err(|source| HistoryError::new(conversation_id.clone(), source))
    }
}

/// Assigns sequential ids and a fixed timestamp.
#[derive(Default)]
pub struct FakeGateway {
    created: AtomicUsize,
    fail_with: Option<TransportError>,
}

impl FakeGateway {
    pub fn failing(error: TransportError) -> Self {
        Self { created: AtomicUsize::new(0), fail_with: Some(error) }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageGateway for FakeGateway {
    async fn create_message(&self, message: &OutgoingMessage) -> Result<Message, TransportError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Message {
            id: MessageId::new(format!("srv-{n}")),
            conversation_id: message.conversation_id.clone(),
            sender_id: message.sender_id.clone(),
            body: message.body.clone(),
            created_at: Utc.timestamp_millis_opt(1_000 + i64::try_from(n).unwrap()).unwrap(),
            media: message.media.clone(),
        })
    }
}

/// Push channel driven by the test through [`FakePush::push`].
#[derive(Default)]
pub struct FakePush {
    senders: Mutex<Vec<mpsc::UnboundedSender<Result<LiveItem, LiveConnectionError>>>>,
    open_failures: Mutex<VecDeque<LiveConnectionError>>,
    opens: AtomicUsize,
    published: Mutex<Vec<Message>>,
    reject_publish: bool,
}

impl FakePush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting_publish() -> Self {
        Self { reject_publish: true, ..Self::default() }
    }

    /// Fail the next `count` open attempts.
    pub fn fail_opens(&self, count: usize) {
        let mut failures = self.open_failures.lock();
        for _ in 0..count {
            failures.push_back(LiveConnectionError::new("refused"));
        }
    }

    /// Deliver an item to the most recent subscriber.
    pub fn push(&self, item: Result<LiveItem, LiveConnectionError>) -> bool {
        self.senders.lock().last().is_some_and(|tx| tx.send(item).is_ok())
    }

    pub fn push_message(&self, message: Message) -> bool {
        self.push(Ok(LiveItem::from(message)))
    }

    /// End every open stream.
    pub fn disconnect(&self) {
        self.senders.lock().clear();
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn has_subscriber(&self) -> bool {
        self.senders.lock().iter().any(|tx| !tx.is_closed())
    }

    pub fn published(&self) -> Vec<Message> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl PushChannel for FakePush {
    async fn open(&self, _conversation_id: &ConversationId) -> Result<PushStream, LiveConnectionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.open_failures.lock().pop_front() {
            return Err(err);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().push(tx);
        Ok(futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
            .boxed())
    }

    async fn publish(&self, message: &Message) -> Result<(), LiveConnectionError> {
        if self.reject_publish {
            return Err(LiveConnectionError::new("publish rejected"));
        }
        self.published.lock().push(message.clone());
        self.push_message(message.clone());
        Ok(())
    }
}
