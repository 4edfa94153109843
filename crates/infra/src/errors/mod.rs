//! Infrastructure error conversions

pub mod conversions;

pub use conversions::{error_body_excerpt, transport_error, InfraError};
