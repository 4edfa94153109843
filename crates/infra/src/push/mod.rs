//! Push channel adapters

pub mod broadcast;
pub mod sse;

pub use broadcast::BroadcastPushChannel;
pub use sse::{SseDecoder, SseFrame, SsePushChannel};
