//! # Acolhe Core
//!
//! Chat synchronization logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for history, message creation and push delivery
//! - The deduplicating message store
//! - The self-healing live subscription
//! - The chat synchronization engine
//!
//! ## Architecture Principles
//! - Only depends on `acolhe-common` and `acolhe-domain`
//! - No HTTP or platform code
//! - All external dependencies via traits

pub mod chat;

// Re-export specific items to avoid ambiguity
pub use chat::ports::{HistorySource, MessageGateway, PushChannel, PushStream};
pub use chat::{
    ChatSyncConfig, ChatSyncEngine, LiveEvent, LiveSource, LiveSubscription, MessageStore,
    SyncEvent, SyncStatus,
};
