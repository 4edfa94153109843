//! Application configuration structures
//!
//! Every section deserializes with defaults so partial files and partial
//! environments produce a usable configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_EVENT_BUFFER, DEFAULT_HISTORY_PAGE_SIZE, DEFAULT_INITIAL_DELAY_MS,
    DEFAULT_JOIN_TIMEOUT_MS, DEFAULT_LIVE_BUFFER, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MAX_HISTORY_PAGES, DEFAULT_MAX_RESUBSCRIBE_ATTEMPTS, DEFAULT_MAX_RETRIES,
};
use crate::errors::{AcolheError, Result};

/// Root configuration for the chat pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub http: HttpRetryConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns `AcolheError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;
        self.http.validate()?;
        self.live.validate()
    }
}

/// Backend REST endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token attached to every request when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_history_pages")]
    pub max_history_pages: u32,
    /// Base URL of the server-sent events endpoint; defaults to `base_url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_base_url: Option<String>,
}

impl ApiConfig {
    pub fn events_base(&self) -> &str {
        self.events_base_url.as_deref().unwrap_or(&self.base_url)
    }

    fn validate(&self) -> Result<()> {
        validate_http_url("api.base_url", &self.base_url)?;
        if let Some(events) = &self.events_base_url {
            validate_http_url("api.events_base_url", events)?;
        }
        if self.page_size == 0 {
            return Err(AcolheError::Config("api.page_size must be positive".into()));
        }
        if self.max_history_pages == 0 {
            return Err(AcolheError::Config("api.max_history_pages must be positive".into()));
        }
        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            page_size: default_page_size(),
            max_history_pages: default_max_history_pages(),
            events_base_url: None,
        }
    }
}

/// Retry envelope for outbound HTTP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub retry_non_idempotent: bool,
    /// Limit for a whole logical request, retries included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
    /// Limit for each individual attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

impl HttpRetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    fn validate(&self) -> Result<()> {
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(AcolheError::Config(format!(
                "http.initial_delay_ms ({}) exceeds http.max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retry_non_idempotent: false,
            deadline_ms: None,
            request_timeout_ms: None,
        }
    }
}

/// Live subscription and session tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Consecutive connection failures tolerated before degrading.
    #[serde(default = "default_max_resubscribe_attempts")]
    pub max_resubscribe_attempts: u32,
    #[serde(default = "default_live_buffer")]
    pub buffer: usize,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

impl LiveConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.buffer == 0 || self.event_buffer == 0 {
            return Err(AcolheError::Config("live buffers must be positive".into()));
        }
        Ok(())
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            max_resubscribe_attempts: default_max_resubscribe_attempts(),
            buffer: default_live_buffer(),
            event_buffer: default_event_buffer(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false }
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(AcolheError::Config(format!("{field} must be an http(s) URL, got '{value}'")))
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_HISTORY_PAGE_SIZE
}

fn default_max_history_pages() -> u32 {
    DEFAULT_MAX_HISTORY_PAGES
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

fn default_max_resubscribe_attempts() -> u32 {
    DEFAULT_MAX_RESUBSCRIBE_ATTEMPTS
}

fn default_live_buffer() -> usize {
    DEFAULT_LIVE_BUFFER
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

fn default_join_timeout_ms() -> u64 {
    DEFAULT_JOIN_TIMEOUT_MS
}

fn default_log_level() -> String {
    "info".to_string()
}
