//! Domain types and models

pub mod chat;
pub mod live;
pub mod sync;

// Re-export chat types for convenience
pub use chat::{
    Conversation, ConversationId, MediaRef, Message, MessageId, MessageSnapshot, OutgoingMessage,
    UserId,
};
pub use live::LiveItem;
pub use sync::SyncState;
