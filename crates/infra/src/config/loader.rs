//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `ACOLHE_API_BASE_URL` is unset, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! Whatever the source, the result is validated before it is returned.
//!
//! ## Environment Variables
//! - `ACOLHE_API_BASE_URL`: REST base URL (required for env loading)
//! - `ACOLHE_API_TOKEN`: Bearer token
//! - `ACOLHE_API_PAGE_SIZE`: History page size
//! - `ACOLHE_API_MAX_HISTORY_PAGES`: Page cap per history fetch
//! - `ACOLHE_EVENTS_BASE_URL`: Server-sent events base URL
//! - `ACOLHE_HTTP_MAX_RETRIES`: Retries after the first attempt
//! - `ACOLHE_HTTP_INITIAL_DELAY_MS` / `ACOLHE_HTTP_MAX_DELAY_MS`: Backoff bounds
//! - `ACOLHE_HTTP_RETRY_NON_IDEMPOTENT`: Retry POST/PATCH too (true/false)
//! - `ACOLHE_HTTP_DEADLINE_MS`: Overall deadline per logical request
//! - `ACOLHE_HTTP_REQUEST_TIMEOUT_MS`: Per-attempt timeout
//! - `ACOLHE_LIVE_MAX_RESUBSCRIBE_ATTEMPTS`: Failures tolerated before degrading
//! - `ACOLHE_LOG_LEVEL`: Default log filter
//! - `ACOLHE_LOG_JSON`: JSON log output (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./acolhe.toml` or `./acolhe.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;

use acolhe_domain::{AcolheError, Config, Result};

use crate::errors::InfraError;

const BASE_URL_VAR: &str = "ACOLHE_API_BASE_URL";
const CONFIG_FILE_NAMES: [&str; 4] = ["acolhe.toml", "acolhe.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `AcolheError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - A value fails validation
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from the process environment
///
/// # Errors
/// Returns `AcolheError::Config` if `ACOLHE_API_BASE_URL` is missing or any
/// variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    load_from_lookup(|key| std::env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup
///
/// Unset optional variables keep their defaults.
///
/// # Errors
/// Same as [`load_from_env`].
pub fn load_from_lookup<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::default();
    config.api.base_url = lookup(BASE_URL_VAR).ok_or_else(|| {
        AcolheError::Config(format!("Missing required environment variable: {BASE_URL_VAR}"))
    })?;
    config.api.auth_token = lookup("ACOLHE_API_TOKEN").or(config.api.auth_token);
    config.api.events_base_url = lookup("ACOLHE_EVENTS_BASE_URL").or(config.api.events_base_url);
    if let Some(size) = parse_var(&lookup, "ACOLHE_API_PAGE_SIZE")? {
        config.api.page_size = size;
    }
    if let Some(pages) = parse_var(&lookup, "ACOLHE_API_MAX_HISTORY_PAGES")? {
        config.api.max_history_pages = pages;
    }

    if let Some(retries) = parse_var(&lookup, "ACOLHE_HTTP_MAX_RETRIES")? {
        config.http.max_retries = retries;
    }
    if let Some(delay) = parse_var(&lookup, "ACOLHE_HTTP_INITIAL_DELAY_MS")? {
        config.http.initial_delay_ms = delay;
    }
    if let Some(delay) = parse_var(&lookup, "ACOLHE_HTTP_MAX_DELAY_MS")? {
        config.http.max_delay_ms = delay;
    }
    config.http.retry_non_idempotent =
        lookup_bool(&lookup, "ACOLHE_HTTP_RETRY_NON_IDEMPOTENT", config.http.retry_non_idempotent);
    config.http.deadline_ms = parse_var(&lookup, "ACOLHE_HTTP_DEADLINE_MS")?.or(config.http.deadline_ms);
    config.http.request_timeout_ms =
        parse_var(&lookup, "ACOLHE_HTTP_REQUEST_TIMEOUT_MS")?.or(config.http.request_timeout_ms);

    if let Some(attempts) = parse_var(&lookup, "ACOLHE_LIVE_MAX_RESUBSCRIBE_ATTEMPTS")? {
        config.live.max_resubscribe_attempts = attempts;
    }

    if let Some(level) = lookup("ACOLHE_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = lookup_bool(&lookup, "ACOLHE_LOG_JSON", config.logging.json);

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. The format is
/// detected by file extension.
///
/// # Errors
/// Returns `AcolheError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - A value fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(AcolheError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            AcolheError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| AcolheError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content, choosing the format by extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents).map_err(|e| InfraError::from(e).into()),
        "json" => serde_json::from_str(contents).map_err(|e| InfraError::from(e).into()),
        _ => Err(AcolheError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a configuration file
///
/// Returns the first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        dirs.push(exe_dir);
    }
    probe_in(&dirs)
}

fn probe_in(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| AcolheError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Parse a boolean variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
/// Anything else counts as `false`; unset yields `default`.
fn lookup_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
