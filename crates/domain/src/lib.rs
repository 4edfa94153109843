//! # Acolhe Domain
//!
//! Business domain types for the Acolhe chat pipeline.
//!
//! This crate contains:
//! - Chat data types (Message, Conversation, push payloads)
//! - The chat error taxonomy and the application-wide error type
//! - Configuration structures
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other Acolhe crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
