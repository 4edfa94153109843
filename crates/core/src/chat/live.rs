//! Self-healing live subscription
//!
//! A pump task owns the push connection, validates every item, and
//! resubscribes with backoff when the connection fails. Consumers read
//! [`LiveEvent`]s from a [`LiveSubscription`]; cancelling or dropping the
//! subscription stops the pump, which drops the connection.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use acolhe_common::{join_with_timeout, BackoffPolicy, CommonResult};
use acolhe_domain::constants::{DEFAULT_LIVE_BUFFER, DEFAULT_MAX_RESUBSCRIBE_ATTEMPTS};
use acolhe_domain::{ConversationId, LiveConnectionError, Message};
use chrono::Utc;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ports::{PushChannel, PushStream};

/// What a live subscription yields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// A validated message for the subscribed conversation.
    Message(Message),
    /// The connection was re-established; items may have been missed.
    Resubscribed,
    /// Resubscription gave up. Nothing follows this event.
    Degraded(LiveConnectionError),
}

/// Factory for live subscriptions over a push channel
#[derive(Clone)]
pub struct LiveSource {
    channel: Arc<dyn PushChannel>,
    backoff: BackoffPolicy,
    max_resubscribe_attempts: u32,
    buffer: usize,
}

impl LiveSource {
    pub fn new(channel: Arc<dyn PushChannel>, backoff: BackoffPolicy) -> Self {
        Self {
            channel,
            backoff,
            max_resubscribe_attempts: DEFAULT_MAX_RESUBSCRIBE_ATTEMPTS,
            buffer: DEFAULT_LIVE_BUFFER,
        }
    }

    /// Consecutive failures tolerated before degrading. `u32::MAX` never gives up.
    pub fn with_max_resubscribe_attempts(mut self, attempts: u32) -> Self {
        self.max_resubscribe_attempts = attempts;
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn channel(&self) -> &Arc<dyn PushChannel> {
        &self.channel
    }

    /// Start receiving live messages for `conversation_id`.
    pub fn subscribe(&self, conversation_id: ConversationId) -> LiveSubscription {
        self.subscribe_with_token(conversation_id, CancellationToken::new())
    }

    /// Like [`Self::subscribe`], stopping also when `cancel` fires.
    pub fn subscribe_with_token(
        &self,
        conversation_id: ConversationId,
        cancel: CancellationToken,
    ) -> LiveSubscription {
        let (tx, events) = mpsc::channel(self.buffer);
        let pump = Pump {
            channel: Arc::clone(&self.channel),
            backoff: self.backoff,
            max_attempts: self.max_resubscribe_attempts,
            conversation_id,
            tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(pump.run());
        LiveSubscription { events, cancel, task: Some(task) }
    }
}

/// Handle to a running live subscription.
///
/// Implements [`Stream`]; the stream ends after cancellation or after a
/// [`LiveEvent::Degraded`] event.
pub struct LiveSubscription {
    events: mpsc::Receiver<LiveEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LiveSubscription {
    /// Next event, or `None` once the subscription is closed.
    pub async fn next(&mut self) -> Option<LiveEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.events.recv().await
    }

    /// Stop the subscription. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel and wait for the pump to release its connection.
    ///
    /// # Errors
    /// Returns the join failure when the pump does not finish in `timeout`.
    pub async fn close(mut self, timeout: Duration) -> CommonResult<()> {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => join_with_timeout("live-subscription", task, timeout).await,
            None => Ok(()),
        }
    }
}

impl Stream for LiveSubscription {
    type Item = LiveEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        this.events.poll_recv(cx)
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Drained {
    Failed(LiveConnectionError),
    Stopped,
}

struct Pump {
    channel: Arc<dyn PushChannel>,
    backoff: BackoffPolicy,
    max_attempts: u32,
    conversation_id: ConversationId,
    tx: mpsc::Sender<LiveEvent>,
    cancel: CancellationToken,
}

impl Pump {
    async fn run(self) {
        let mut failures: u32 = 0;
        let mut first_open = true;

        loop {
            let opened = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                opened = self.channel.open(&self.conversation_id) => opened,
            };

            let error = match opened {
                Ok(stream) => {
                    if first_open {
                        debug!(conversation_id = %self.conversation_id, "Live subscription opened");
                    } else {
                        info!(conversation_id = %self.conversation_id, "Live subscription re-established");
                        if !self.emit(LiveEvent::Resubscribed).await {
                            return;
                        }
                    }
                    first_open = false;
                    match self.drain(stream, &mut failures).await {
                        Drained::Failed(error) => error,
                        Drained::Stopped => return,
                    }
                }
                Err(error) => {
                    first_open = false;
                    error
                }
            };

            failures = failures.saturating_add(1);
            if failures > self.max_attempts {
                warn!(
                    conversation_id = %self.conversation_id,
                    failures,
                    error = %error,
                    "Live resubscription exhausted, degrading"
                );
                let _ = self.emit(LiveEvent::Degraded(error)).await;
                return;
            }

            let delay = self.backoff.delay(failures);
            warn!(
                conversation_id = %self.conversation_id,
                attempt = failures,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Live connection failed, resubscribing"
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn drain(&self, mut stream: PushStream, failures: &mut u32) -> Drained {
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Drained::Stopped,
                next = stream.next() => next,
            };

            let item = match next {
                None => return Drained::Failed(LiveConnectionError::new("push stream ended")),
                Some(Err(error)) => return Drained::Failed(error),
                Some(Ok(item)) => item,
            };

            match item.into_message(Utc::now()) {
                Ok(message) if message.conversation_id != self.conversation_id => {
                    warn!(
                        conversation_id = %self.conversation_id,
                        foreign_conversation = %message.conversation_id,
                        message_id = %message.id,
                        "Dropping live item for another conversation"
                    );
                }
                Ok(message) => {
                    *failures = 0;
                    if !self.emit(LiveEvent::Message(message)).await {
                        return Drained::Stopped;
                    }
                }
                Err(malformed) => {
                    warn!(
                        conversation_id = %self.conversation_id,
                        error = %malformed,
                        "Dropping malformed live item"
                    );
                }
            }
        }
    }

    /// False when the subscription is gone.
    async fn emit(&self, event: LiveEvent) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }
}
