//! Server-sent events push channel
//!
//! Subscribes with `GET {events_base}/conversations/{id}/events` and turns
//! `message` frames into [`LiveItem`]s. Opening never retries: the live
//! subscription above owns reconnection.

use std::sync::Arc;

use acolhe_core::{PushChannel, PushStream};
use acolhe_domain::{AcolheError, ConversationId, LiveConnectionError, LiveItem, Message};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Method, RequestBuilder};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::chat::rest::parse_base_url;
use crate::http::{ensure_success, RetryingTransport};

const EVENT_STREAM: &str = "text/event-stream";

/// Longest unterminated line the decoder buffers before failing the stream.
pub const MAX_SSE_LINE_BYTES: usize = 64 * 1024;

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` parser.
///
/// Accepts arbitrary chunk boundaries, including ones that split a line or a
/// UTF-8 sequence. Bytes already searched for a line break are not searched
/// again, and a pending line longer than the limit is an error.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    scanned: usize,
    max_line: usize,
    event: Option<String>,
    data: Vec<String>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_SSE_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn with_max_line(max_line: usize) -> Self {
        Self { buffer: Vec::new(), scanned: 0, max_line, event: None, data: Vec::new() }
    }

    /// Feed a chunk and return every frame it completes.
    ///
    /// # Errors
    /// Returns a `LiveConnectionError` when an unterminated line outgrows the
    /// limit. The decoder is reset and the stream should be abandoned.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseFrame>, LiveConnectionError> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut scan = self.scanned;
        while let Some(offset) = buffer[scan..].iter().position(|byte| *byte == b'\n') {
            let end = scan + offset;
            let decoded = String::from_utf8_lossy(&buffer[start..end]);
            let line = decoded.strip_suffix('\r').unwrap_or(&*decoded);
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
            start = end + 1;
            scan = start;
        }
        buffer.drain(..start);

        if buffer.len() > self.max_line {
            let pending = buffer.len();
            *self = Self::with_max_line(self.max_line);
            return Err(LiveConnectionError::new(format!(
                "event stream line of {pending} bytes exceeds {} byte limit",
                self.max_line
            )));
        }
        self.scanned = buffer.len();
        self.buffer = buffer;
        Ok(frames)
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseFrame { event, data: std::mem::take(&mut self.data).join("\n") })
    }
}

/// Interpret a frame as a live item. Non-message frames and bad JSON yield `None`.
fn frame_item(frame: &SseFrame) -> Option<LiveItem> {
    match frame.event.as_deref() {
        None | Some("message") => match serde_json::from_str(&frame.data) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(error = %err, "Skipping undecodable push frame");
                None
            }
        },
        Some(other) => {
            debug!(event = other, "Skipping push frame");
            None
        }
    }
}

pub struct SsePushChannel {
    transport: Arc<RetryingTransport>,
    base: Url,
    auth_token: Option<String>,
}

impl SsePushChannel {
    /// # Errors
    /// Returns `AcolheError::Config` when `events_base` is not an http(s) URL.
    pub fn new(
        transport: Arc<RetryingTransport>,
        events_base: &str,
        auth_token: Option<String>,
    ) -> Result<Self, AcolheError> {
        Ok(Self { transport, base: parse_base_url(events_base)?, auth_token })
    }

    fn events_url(&self, conversation_id: &ConversationId) -> Result<Url, LiveConnectionError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| LiveConnectionError::new(format!("cannot extend {}", self.base)))?
            .pop_if_empty()
            .extend(["conversations", conversation_id.as_str(), "events"]);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl PushChannel for SsePushChannel {
    #[instrument(skip(self, conversation_id), fields(conversation_id = %conversation_id))]
    async fn open(&self, conversation_id: &ConversationId) -> Result<PushStream, LiveConnectionError> {
        let request = self
            .transport
            .client()
            .get(self.events_url(conversation_id)?)
            .header(ACCEPT, EVENT_STREAM)
            .header(CACHE_CONTROL, "no-cache");

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|err| LiveConnectionError::new(format!("event stream request failed: {err}")))?;
        let response = ensure_success(response)
            .await
            .map_err(|err| LiveConnectionError::new(format!("event stream rejected: {err}")))?;
        debug!("Event stream opened");

        let mut decoder = SseDecoder::default();
        let stream = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => match decoder.push(&bytes) {
                    Ok(frames) => frames.iter().filter_map(frame_item).map(Ok).collect::<Vec<_>>(),
                    Err(err) => vec![Err(err)],
                },
                Err(err) => {
                    vec![Err(LiveConnectionError::new(format!("event stream interrupted: {err}")))]
                }
            })
            .flat_map(futures::stream::iter);
        Ok(stream.boxed())
    }

    #[instrument(skip(self, message), fields(message_id = %message.id))]
    async fn publish(&self, message: &Message) -> Result<(), LiveConnectionError> {
        let request = self
            .transport
            .request(Method::POST, self.events_url(&message.conversation_id)?)
            .json(&LiveItem::from(message.clone()));

        let response = self
            .transport
            .execute(self.authorize(request))
            .await
            .map_err(|err| LiveConnectionError::new(format!("publish failed: {err}")))?;
        ensure_success(response)
            .await
            .map_err(|err| LiveConnectionError::new(format!("publish rejected: {err}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use acolhe_common::testing::timeout_ok;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn channel(server: &MockServer) -> SsePushChannel {
        let transport = RetryingTransport::builder()
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .build()
            .expect("transport");
        SsePushChannel::new(Arc::new(transport), &server.uri(), None).expect("channel")
    }

    #[test]
    fn decoder_handles_split_chunks_and_crlf() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: mess").unwrap().is_empty());
        assert!(decoder.push(b"age\r\ndata: {\"id\"").unwrap().is_empty());
        let frames = decoder.push(b":\"1\"}\r\n\r\n").unwrap();
        assert_eq!(
            frames,
            vec![SseFrame { event: Some("message".into()), data: "{\"id\":\"1\"}".into() }]
        );
    }

    #[test]
    fn decoder_joins_multiline_data_and_skips_comments() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push(b": ping\n\ndata: a\ndata:b\n\nevent: keep-alive\n\n").unwrap();
        assert_eq!(frames, vec![SseFrame { event: None, data: "a\nb".into() }]);
    }

    #[test]
    fn decoder_survives_split_utf8() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: olá\n\n".as_bytes();
        let (head, tail) = bytes.split_at(9);
        assert!(decoder.push(head).unwrap().is_empty());
        assert_eq!(decoder.push(tail).unwrap()[0].data, "olá");
    }

    #[test]
    fn decoder_accepts_long_line_in_small_chunks() {
        let mut decoder = SseDecoder::with_max_line(64);
        let payload = "x".repeat(60);
        let line = format!("data: {payload}\n\n");
        let (head, tail) = line.as_bytes().split_at(40);
        for piece in head.chunks(3) {
            assert!(decoder.push(piece).unwrap().is_empty());
        }
        let frames = decoder.push(tail).unwrap();
        assert_eq!(frames, vec![SseFrame { event: None, data: payload }]);
    }

    #[test]
    fn decoder_rejects_unterminated_oversized_line() {
        let mut decoder = SseDecoder::with_max_line(16);
        assert!(decoder.push(b"data: 0123456789").unwrap().is_empty());
        let err = decoder.push(b"abcdef").unwrap_err();
        assert!(err.reason.contains("exceeds 16 byte limit"), "got {err}");

        // The decoder starts clean afterwards
        let frames = decoder.push(b"data: ok\n\n").unwrap();
        assert_eq!(frames, vec![SseFrame { event: None, data: "ok".into() }]);
    }

    #[test]
    fn only_message_frames_become_items() {
        let message = SseFrame { event: Some("message".into()), data: r#"{"id":"1"}"#.into() };
        assert_eq!(frame_item(&message).and_then(|item| item.id).unwrap().as_str(), "1");

        let unnamed = SseFrame { event: None, data: r#"{"body":"x"}"#.into() };
        assert!(frame_item(&unnamed).is_some());

        let other = SseFrame { event: Some("typing".into()), data: "{}".into() };
        assert!(frame_item(&other).is_none());

        let garbage = SseFrame { event: None, data: "not json".into() };
        assert!(frame_item(&garbage).is_none());
    }

    #[tokio::test]
    async fn open_streams_message_frames() {
        let server = MockServer::start().await;
        let body = concat!(
            ": welcome\n\n",
            "event: message\n",
            "data: {\"id\":\"1\",\"conversation_id\":\"C1\",\"sender_id\":\"u1\",\"body\":\"oi\"}\n\n",
            "event: keep-alive\ndata: \n\n",
            "data: not json\n\n",
            "data: {\"id\":\"2\",\"conversation_id\":\"C1\",\"sender_id\":\"u2\"}\n\n",
        );
        Mock::given(method("GET"))
            .and(path("/conversations/C1/events"))
            .and(header("accept", EVENT_STREAM))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, EVENT_STREAM))
            .expect(1)
            .mount(&server)
            .await;

        let stream = channel(&server).open(&ConversationId::from("C1")).await.unwrap();
        let items: Vec<_> = timeout_ok(Duration::from_secs(2), stream.collect::<Vec<_>>())
            .await
            .expect("stream did not end");

        let ids: Vec<String> = items
            .into_iter()
            .map(|item| item.unwrap().id.unwrap().as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn oversized_line_fails_the_stream() {
        let server = MockServer::start().await;
        let body = format!("data: {}", "x".repeat(MAX_SSE_LINE_BYTES + 1));
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, EVENT_STREAM))
            .mount(&server)
            .await;

        let mut stream = channel(&server).open(&ConversationId::from("C1")).await.unwrap();
        let first = timeout_ok(Duration::from_secs(2), stream.next())
            .await
            .expect("stream stalled")
            .expect("stream ended without an error");
        assert!(first.unwrap_err().reason.contains("byte limit"));
    }

    #[tokio::test]
    async fn open_rejects_error_status_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let err = channel(&server).open(&ConversationId::from("C1")).await.err().unwrap();
        assert!(err.reason.contains("503"), "got {err}");
    }

    #[tokio::test]
    async fn publish_posts_to_the_events_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversations/C1/events"))
            .and(body_partial_json(json!({"id": "7", "conversation_id": "C1"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let message = Message {
            id: "7".into(),
            conversation_id: "C1".into(),
            sender_id: "u1".into(),
            body: "oi".into(),
            created_at: chrono::Utc::now(),
            media: None,
        };
        channel(&server).publish(&message).await.unwrap();
    }

    #[tokio::test]
    async fn publish_failure_is_a_connection_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let message = Message {
            id: "7".into(),
            conversation_id: "C1".into(),
            sender_id: "u1".into(),
            body: "oi".into(),
            created_at: chrono::Utc::now(),
            media: None,
        };
        let err = channel(&server).publish(&message).await.unwrap_err();
        assert!(err.reason.starts_with("publish rejected"));
    }
}
