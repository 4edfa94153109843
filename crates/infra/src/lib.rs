//! # Acolhe Infrastructure
//!
//! Infrastructure implementations of core chat ports.
//!
//! This crate contains:
//! - The retrying HTTP transport (reqwest)
//! - The REST chat client (history and message creation)
//! - Push channel adapters (in-process broadcast, server-sent events)
//! - Configuration loading and tracing setup
//! - Engine wiring from configuration
//!
//! ## Architecture
//! - Implements traits defined in `acolhe-core`
//! - Contains all "impure" code (network, files, environment)

pub mod chat;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod push;

// Re-export commonly used items
pub use chat::{
    build_engine, build_engine_with_transport, build_sse_engine, RestChatClient, RestChatConfig,
};
pub use errors::InfraError;
pub use http::{decode_json, ensure_success, RetryingTransport, RetryingTransportBuilder};
pub use observability::init_tracing;
pub use push::{BroadcastPushChannel, SsePushChannel};
