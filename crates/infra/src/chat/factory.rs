//! Engine wiring from configuration

use std::sync::Arc;

use acolhe_core::{ChatSyncConfig, ChatSyncEngine, LiveSource, PushChannel};
use acolhe_domain::{AcolheError, Config};
use tracing::info;

use super::rest::{RestChatClient, RestChatConfig};
use crate::http::{RetryingTransport, RetryingTransportBuilder};
use crate::push::SsePushChannel;

/// Build a ready-to-start engine over the REST backend and `push`.
///
/// # Errors
/// Returns `AcolheError::Config` when the configuration is invalid or the
/// HTTP client cannot be built.
pub fn build_engine(
    config: &Config,
    push: Arc<dyn PushChannel>,
) -> Result<ChatSyncEngine, AcolheError> {
    config.validate()?;
    let transport = Arc::new(RetryingTransportBuilder::from_config(&config.http).build()?);
    assemble(config, transport, push)
}

/// Like [`build_engine`], receiving live messages over server-sent events
/// from `api.events_base_url`. The transport is shared by both directions.
///
/// # Errors
/// Same as [`build_engine`].
pub fn build_sse_engine(config: &Config) -> Result<ChatSyncEngine, AcolheError> {
    config.validate()?;
    let transport = Arc::new(RetryingTransportBuilder::from_config(&config.http).build()?);
    let push = SsePushChannel::new(
        Arc::clone(&transport),
        config.api.events_base(),
        config.api.auth_token.clone(),
    )?;
    assemble(config, transport, Arc::new(push))
}

/// Build an engine over an existing transport. Engines for several
/// conversations can share one connection pool this way; stopping one never
/// cancels requests made by another.
///
/// # Errors
/// Returns `AcolheError::Config` when the configuration is invalid.
pub fn build_engine_with_transport(
    config: &Config,
    transport: Arc<RetryingTransport>,
    push: Arc<dyn PushChannel>,
) -> Result<ChatSyncEngine, AcolheError> {
    config.validate()?;
    assemble(config, transport, push)
}

fn assemble(
    config: &Config,
    transport: Arc<RetryingTransport>,
    push: Arc<dyn PushChannel>,
) -> Result<ChatSyncEngine, AcolheError> {
    let backoff = transport.backoff();
    let rest = Arc::new(RestChatClient::new(transport, RestChatConfig::from(&config.api))?);
    let live = LiveSource::new(push, backoff)
        .with_max_resubscribe_attempts(config.live.max_resubscribe_attempts)
        .with_buffer(config.live.buffer);

    info!(base_url = %config.api.base_url, "Chat engine assembled");
    Ok(ChatSyncEngine::new(rest.clone(), rest, live, ChatSyncConfig::from(&config.live)))
}
