//! Modular common utilities shared across Acolhe crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error types
//! - `runtime`: async infrastructure (backoff, task lifecycle)
//! - `observability`: tracing integration
//! - `test-utils`: async test helpers for downstream crates

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod lifecycle;
#[cfg(feature = "runtime")]
pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "runtime", feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult};
#[cfg(feature = "runtime")]
pub use lifecycle::join_with_timeout;
#[cfg(feature = "runtime")]
pub use resilience::BackoffPolicy;
