//! Lifecycle helpers for async components

pub mod join;

pub use join::join_with_timeout;
