//! Application constants
//!
//! Centralized location for the domain-level defaults used throughout the
//! chat pipeline.

// HTTP retry envelope
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 200;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5_000;

/// Methods whose repeated execution has the same server-side effect as one.
pub const IDEMPOTENT_METHODS: [&str; 5] = ["GET", "HEAD", "OPTIONS", "PUT", "DELETE"];

/// Gateway statuses treated as transient.
pub const RETRYABLE_STATUSES: [u16; 3] = [502, 503, 504];

// History pagination
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_HISTORY_PAGES: u32 = 50;

// Live channel
pub const DEFAULT_MAX_RESUBSCRIBE_ATTEMPTS: u32 = 5;
pub const DEFAULT_LIVE_BUFFER: usize = 64;

// Engine
pub const DEFAULT_EVENT_BUFFER: usize = 128;
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 5_000;

/// Header carrying the client-generated key for message creation.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Longest response body excerpt kept in a status error.
pub const MAX_ERROR_BODY_CHARS: usize = 512;
