use std::time::Duration;

use acolhe_common::BackoffPolicy;
use acolhe_domain::constants::{
    DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RETRIES, IDEMPOTENT_METHODS,
    RETRYABLE_STATUSES,
};
use acolhe_domain::{AcolheError, HttpRetryConfig, TransportError};
use reqwest::{Client as ReqwestClient, Method, Request, RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{transport_error, InfraError};

/// HTTP client that retries transient failures of idempotent requests.
///
/// One call to [`RetryingTransport::execute`] is one logical request. The
/// final response is returned as-is whatever its status; only transport
/// failures become errors.
#[derive(Clone)]
pub struct RetryingTransport {
    client: ReqwestClient,
    max_retries: u32,
    backoff: BackoffPolicy,
    retry_non_idempotent: bool,
    deadline: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl RetryingTransport {
    /// Start building a new transport.
    pub fn builder() -> RetryingTransportBuilder {
        RetryingTransportBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, AcolheError> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// The underlying client, for requests that must bypass retries.
    pub fn client(&self) -> &ReqwestClient {
        &self.client
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Execute the provided request builder with retry semantics.
    pub async fn execute(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        self.execute_with_cancel(builder, &CancellationToken::new()).await
    }

    /// Like [`Self::execute`], returning `Cancelled` as soon as `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        builder: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError> {
        let request = builder.build().map_err(|err| transport_error(&err))?;

        let Some(deadline) = self.deadline else {
            return self.run(request, cancel).await;
        };
        match tokio::time::timeout(deadline, self.run(request, cancel)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?deadline, "HTTP request exceeded its deadline");
                Err(TransportError::DeadlineExceeded { deadline })
            }
        }
    }

    /// Whether a failed `method` request may be sent again.
    pub fn is_retry_eligible(&self, method: &Method) -> bool {
        self.retry_non_idempotent || IDEMPOTENT_METHODS.contains(&method.as_str())
    }

    async fn run(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, TransportError> {
        if request.timeout().is_none() {
            *request.timeout_mut() = self.request_timeout;
        }

        let method = request.method().clone();
        let url = request.url().clone();
        let eligible = self.is_retry_eligible(&method);
        let mut pending = Some(request);
        let mut attempt: u32 = 0;

        while let Some(current) = pending.take() {
            attempt += 1;

            // Streaming bodies cannot be cloned and get exactly one attempt.
            let spare = if eligible && attempt <= self.max_retries { current.try_clone() } else { None };

            debug!(attempt, %method, %url, "sending HTTP request");
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TransportError::Cancelled),
                outcome = self.client.execute(current) => outcome,
            };

            let reason = match &outcome {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt, %method, %url, %status, "received HTTP response");
                    is_retryable_status(status).then(|| format!("HTTP {}", status.as_u16()))
                }
                Err(err) => {
                    debug!(attempt, %method, %url, error = %err, "HTTP request failed");
                    should_retry_error(err).then(|| err.to_string())
                }
            };

            match (outcome, reason, spare) {
                (outcome, Some(reason), Some(next)) => {
                    if let Ok(response) = outcome {
                        drain(response, cancel).await?;
                    }
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        event = "RetryAttempt",
                        attempt,
                        max_retries = self.max_retries,
                        %method,
                        %url,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        reason = %reason,
                        "retrying HTTP request"
                    );
                    sleep_or_cancel(delay, cancel).await?;
                    pending = Some(next);
                }
                (Ok(response), _, _) => return Ok(response),
                (Err(err), _, _) => return Err(transport_error(&err)),
            }
        }

        Err(TransportError::InvalidRequest("request was not sent".into()))
    }
}

/// Builder for [`RetryingTransport`].
#[derive(Debug)]
pub struct RetryingTransportBuilder {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    retry_non_idempotent: bool,
    deadline: Option<Duration>,
    request_timeout: Option<Duration>,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
}

impl Default for RetryingTransportBuilder {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            retry_non_idempotent: false,
            deadline: None,
            request_timeout: None,
            user_agent: None,
            default_headers: None,
        }
    }
}

impl RetryingTransportBuilder {
    /// Seed every setting from configuration.
    pub fn from_config(config: &HttpRetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            retry_non_idempotent: config.retry_non_idempotent,
            deadline: config.deadline(),
            request_timeout: config.request_timeout(),
            ..Self::default()
        }
    }

    /// Retries after the first attempt; `3` means up to four attempts.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn retry_non_idempotent(mut self, enabled: bool) -> Self {
        self.retry_non_idempotent = enabled;
        self
    }

    /// Limit for the whole call, retries and backoff included.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Limit for each individual attempt.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<RetryingTransport, AcolheError> {
        let backoff = BackoffPolicy::try_new(self.initial_delay, self.max_delay)
            .map_err(|err| AcolheError::Config(err.to_string()))?;

        let mut builder = ReqwestClient::builder().no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| {
            let infra: InfraError = err.into();
            AcolheError::from(infra)
        })?;

        Ok(RetryingTransport {
            client,
            max_retries: self.max_retries,
            backoff,
            retry_non_idempotent: self.retry_non_idempotent,
            deadline: self.deadline,
            request_timeout: self.request_timeout,
        })
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status.as_u16())
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_request() {
        return true;
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        if err.is_connect() {
            return true;
        }
    }
    false
}

/// Read and discard a body so the connection can be reused.
async fn drain(response: Response, cancel: &CancellationToken) -> Result<(), TransportError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TransportError::Cancelled),
        _ = response.bytes() => Ok(()),
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), TransportError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TransportError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}
