//! Conversions from external infrastructure errors into domain errors.

use acolhe_domain::constants::MAX_ERROR_BODY_CHARS;
use acolhe_domain::{AcolheError, TransportError};
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub AcolheError);

impl From<InfraError> for AcolheError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<AcolheError> for InfraError {
    fn from(value: AcolheError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoAcolheError {
    fn into_acolhe(self) -> AcolheError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TransportError */
/* -------------------------------------------------------------------------- */

/// Classify a reqwest failure for the retry envelope.
pub fn transport_error(err: &HttpError) -> TransportError {
    if err.is_timeout() {
        return TransportError::Connection(format!("HTTP request timed out: {err}"));
    }

    #[cfg(not(target_arch = "wasm32"))]
    if err.is_connect() {
        return TransportError::Connection(format!("HTTP connection failure: {err}"));
    }

    if err.is_builder() {
        return TransportError::InvalidRequest(err.to_string());
    }

    if err.is_decode() {
        return TransportError::Decode(err.to_string());
    }

    if let Some(status) = err.status() {
        return TransportError::Status { status: status.as_u16(), body: String::new() };
    }

    TransportError::Connection(err.to_string())
}

/// Trim a response body for inclusion in an error.
pub fn error_body_excerpt(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut excerpt: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    excerpt.push('…');
    excerpt
}

/* -------------------------------------------------------------------------- */
/* TransportError → AcolheError */
/* -------------------------------------------------------------------------- */

impl IntoAcolheError for TransportError {
    fn into_acolhe(self) -> AcolheError {
        match self {
            TransportError::Decode(message) => AcolheError::Serialization(message),
            TransportError::InvalidRequest(message) => AcolheError::InvalidInput(message),
            other => AcolheError::Network(other.to_string()),
        }
    }
}

impl From<TransportError> for InfraError {
    fn from(value: TransportError) -> Self {
        InfraError(value.into_acolhe())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → AcolheError */
/* -------------------------------------------------------------------------- */

impl IntoAcolheError for HttpError {
    fn into_acolhe(self) -> AcolheError {
        if self.is_builder() {
            return AcolheError::Config(format!("failed to build HTTP client: {self}"));
        }
        transport_error(&self).into_acolhe()
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_acolhe())
    }
}

/* -------------------------------------------------------------------------- */
/* config parsing → AcolheError */
/* -------------------------------------------------------------------------- */

impl From<toml::de::Error> for InfraError {
    fn from(value: toml::de::Error) -> Self {
        InfraError(AcolheError::Config(format!("Invalid TOML format: {value}")))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(AcolheError::Config(format!("Invalid JSON format: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
