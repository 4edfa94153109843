//! Resilience primitives for transient failures
//!
//! Only the delay calculation lives here. Retry loops belong to the callers
//! that know which failures are transient (HTTP transport, live resubscribe).

pub mod backoff;

pub use backoff::{BackoffPolicy, MAX_BACKOFF_EXPONENT};
