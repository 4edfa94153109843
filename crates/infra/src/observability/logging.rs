//! Tracing subscriber bootstrap

use acolhe_domain::LoggingConfig;
use tracing_subscriber::EnvFilter;

const FALLBACK_FILTER: &str = "info";

/// Install the global tracing subscriber.
///
/// Filter precedence:
/// 1) `RUST_LOG`
/// 2) `config.level`
/// 3) `info`
///
/// Returns `false` when a global subscriber was already installed, in which
/// case nothing changes.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = filter_for(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(), &config.level);
    let builder = tracing_subscriber::fmt().with_target(true).with_env_filter(filter);

    let installed = if config.json {
        builder.json().with_current_span(true).try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    if installed {
        tracing::debug!(json = config.json, "Tracing initialized");
    }
    installed
}

fn filter_for(env_value: Option<&str>, level: &str) -> EnvFilter {
    [env_value, Some(level)]
        .into_iter()
        .flatten()
        .filter(|value| !value.trim().is_empty())
        .find_map(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(FALLBACK_FILTER))
}
