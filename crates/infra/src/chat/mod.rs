//! Chat backend adapters and engine wiring

pub mod factory;
pub mod rest;

pub use factory::{build_engine, build_engine_with_transport, build_sse_engine};
pub use rest::{RestChatClient, RestChatConfig};
