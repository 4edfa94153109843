//! HTTP transport with retry, deadline and cancellation support

pub mod client;
pub mod response;

pub use client::{RetryingTransport, RetryingTransportBuilder};
pub use response::{decode_json, ensure_success};
