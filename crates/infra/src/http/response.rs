//! Helpers for turning final responses into typed results

use acolhe_domain::TransportError;
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::errors::{error_body_excerpt, transport_error};

/// Pass 2xx responses through; anything else becomes `TransportError::Status`
/// carrying an excerpt of the body.
pub async fn ensure_success(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status { status: status.as_u16(), body: error_body_excerpt(&body) })
}

/// Check the status, then decode the body as JSON.
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    let response = ensure_success(response).await?;
    let bytes = response.bytes().await.map_err(|err| transport_error(&err))?;
    serde_json::from_slice(&bytes).map_err(|err| TransportError::Decode(err.to_string()))
}
