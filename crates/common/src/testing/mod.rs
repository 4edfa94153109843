//! Testing utilities and helpers
//!
//! - **[`async_utils`]**: bounded waits for async tests
//!
//! ```rust
//! use std::time::Duration;
//!
//! async fn wait_for_flag(flag: std::sync::Arc<std::sync::atomic::AtomicBool>) {
//!     acolhe_common::assert_eventually_async!(Duration::from_secs(1), async {
//!         flag.load(std::sync::atomic::Ordering::SeqCst)
//!     });
//! }
//! ```

pub mod async_utils;

// `assert_eventually_async!` is exported at the crate root
pub use async_utils::timeout_ok;
