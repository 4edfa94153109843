//! REST client for the chat backend
//!
//! Implements [`HistorySource`] (paginated backlog) and [`MessageGateway`]
//! (message creation) on top of [`RetryingTransport`]. Retry policy lives in
//! the transport; this client never retries on its own.

use std::collections::HashSet;
use std::sync::Arc;

use acolhe_core::{HistorySource, MessageGateway};
use acolhe_domain::constants::IDEMPOTENCY_KEY_HEADER;
use acolhe_domain::{
    AcolheError, ApiConfig, ConversationId, HistoryError, Message, OutgoingMessage, TransportError,
};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::http::{decode_json, RetryingTransport};

/// Configuration for [`RestChatClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestChatConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub page_size: u32,
    /// Upper bound on pages per fetch, guarding against cursor loops.
    pub max_pages: u32,
}

impl From<&ApiConfig> for RestChatConfig {
    fn from(api: &ApiConfig) -> Self {
        Self {
            base_url: api.base_url.clone(),
            auth_token: api.auth_token.clone(),
            page_size: api.page_size.max(1),
            max_pages: api.max_history_pages.max(1),
        }
    }
}

/// One page of `GET /conversations/{id}/messages`
#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    next_cursor: Option<String>,
}

pub struct RestChatClient {
    transport: Arc<RetryingTransport>,
    config: RestChatConfig,
    base: Url,
}

impl RestChatClient {
    /// # Errors
    /// Returns `AcolheError::Config` when the base URL is not an absolute
    /// http(s) URL.
    pub fn new(transport: Arc<RetryingTransport>, config: RestChatConfig) -> Result<Self, AcolheError> {
        let base = parse_base_url(&config.base_url)?;
        Ok(Self { transport, config, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::InvalidRequest(format!("cannot extend {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_page(
        &self,
        conversation_id: &ConversationId,
        cursor: Option<&str>,
    ) -> Result<MessagePage, TransportError> {
        let url = self.endpoint(&["conversations", conversation_id.as_str(), "messages"])?;
        let mut request = self
            .transport
            .request(Method::GET, url)
            .query(&[("limit", self.config.page_size.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = self.transport.execute(self.authorize(request)).await?;
        decode_json(response).await
    }
}

#[async_trait]
impl HistorySource for RestChatClient {
    #[instrument(skip(self, conversation_id), fields(conversation_id = %conversation_id))]
    async fn fetch(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, HistoryError> {
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen_cursors = HashSet::new();

        for page_number in 1..=self.config.max_pages {
            let page = self
                .fetch_page(conversation_id, cursor.as_deref())
                .await
                .map_err(|source| HistoryError::new(conversation_id.clone(), source))?;
            messages.extend(page.messages);

            match page.next_cursor.filter(|next| !next.is_empty()) {
                None => {
                    debug!(pages = page_number, messages = messages.len(), "History loaded");
                    return Ok(messages);
                }
                Some(next) if !seen_cursors.insert(next.clone()) => {
                    warn!(cursor = %next, "History cursor repeated, stopping pagination");
                    return Ok(messages);
                }
                Some(next) => cursor = Some(next),
            }
        }

        warn!(max_pages = self.config.max_pages, "History pagination hit page cap");
        Ok(messages)
    }
}

#[async_trait]
impl MessageGateway for RestChatClient {
    #[instrument(skip(self, message), fields(conversation_id = %message.conversation_id))]
    async fn create_message(&self, message: &OutgoingMessage) -> Result<Message, TransportError> {
        let idempotency_key = Uuid::new_v4().to_string();
        let request = self
            .transport
            .request(Method::POST, self.endpoint(&["messages"])?)
            .header(IDEMPOTENCY_KEY_HEADER, &idempotency_key)
            .json(message);

        let response = self.transport.execute(self.authorize(request)).await?;
        let created: Message = decode_json(response).await?;
        debug!(message_id = %created.id, %idempotency_key, "Message created");
        Ok(created)
    }
}

pub(crate) fn parse_base_url(raw: &str) -> Result<Url, AcolheError> {
    let url = Url::parse(raw)
        .map_err(|e| AcolheError::Config(format!("Invalid base URL '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(AcolheError::Config(format!("Base URL must be http(s): '{raw}'")));
    }
    Ok(url)
}
