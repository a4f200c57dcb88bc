//! HTTP client construction and request helpers with bounded retry.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::HttpSettings;
use crate::ports::PortError;

/// Retry behaviour for transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on every further retry.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_base: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (zero-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2_u32.saturating_pow(retry))
    }
}

/// Build the shared HTTP client.
///
/// # Errors
///
/// Returns [`PortError::Network`] when the TLS backend cannot be initialised.
pub fn build_client(settings: &HttpSettings) -> Result<Client, PortError> {
    Ok(Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(settings.timeout)
        .build()?)
}

/// Statuses worth repeating: rate limiting and gateway/server hiccups.
#[must_use]
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn classify_status(status: StatusCode) -> Option<PortError> {
    if status.is_success() {
        None
    } else if is_transient_status(status) {
        Some(PortError::TransientTransport(format!("HTTP {status}")))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Some(PortError::AuthFailure(format!("HTTP {status}")))
    } else {
        Some(PortError::SourceUnavailable(format!("HTTP {status}")))
    }
}

fn classify_send_error(err: reqwest::Error) -> PortError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        PortError::TransientTransport(err.to_string())
    } else {
        PortError::Network(err)
    }
}

/// Send a request, retrying transient failures with exponential backoff.
///
/// Once retries are exhausted the last transient failure is reported as
/// [`PortError::SourceUnavailable`]. Requests whose body cannot be cloned get
/// exactly one attempt.
///
/// # Errors
///
/// Returns a [`PortError`] for non-success statuses and network failures.
pub async fn send_with_retry(
    req: RequestBuilder,
    policy: &RetryPolicy,
) -> Result<Response, PortError> {
    let mut retry = 0;
    loop {
        let Some(attempt) = req.try_clone() else {
            return send_once(req).await.map_err(|failure| give_up(failure, 1));
        };

        match send_once(attempt).await {
            Ok(resp) => return Ok(resp),
            Err(failure) if failure.is_transient() && retry < policy.max_retries => {
                let delay = policy.backoff(retry);
                warn!(error = %failure, retry = retry + 1, ?delay, "transient failure, retrying");
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(failure) => return Err(give_up(failure, retry + 1)),
        }
    }
}

async fn send_once(req: RequestBuilder) -> Result<Response, PortError> {
    let resp = req.send().await.map_err(classify_send_error)?;
    match classify_status(resp.status()) {
        None => Ok(resp),
        Some(err) => Err(err),
    }
}

// Transient failures that survive every attempt mean the source is unavailable.
fn give_up(failure: PortError, attempts: u32) -> PortError {
    if failure.is_transient() {
        PortError::SourceUnavailable(format!("gave up after {attempts} attempt(s): {failure}"))
    } else {
        failure
    }
}

/// Send with retry and decode the JSON body.
///
/// # Errors
///
/// Returns a [`PortError`] when the request fails or the body is not the expected JSON.
pub async fn fetch_json<T: DeserializeOwned>(
    req: RequestBuilder,
    policy: &RetryPolicy,
) -> Result<T, PortError> {
    let resp = send_with_retry(req, policy).await?;
    let body = resp.bytes().await.map_err(PortError::from)?;
    serde_json::from_slice(&body).map_err(|err| PortError::MalformedResponse(err.to_string()))
}
