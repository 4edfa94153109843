//! Chat synchronization: ports, message store, live subscription and engine

pub mod engine;
pub mod live;
pub mod ports;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{ChatSyncConfig, ChatSyncEngine, SyncEvent, SyncStatus};
pub use live::{LiveEvent, LiveSource, LiveSubscription};
pub use ports::{HistorySource, MessageGateway, PushChannel, PushStream};
pub use store::MessageStore;
