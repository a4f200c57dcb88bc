//! Traits describing the external collaborators and the errors they report.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Error as ReqwestError;

use crate::model::{
    DayKind, ForecastEntry, PollutionReading, RecipientId, Report, TemplateMessage,
};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to external services.
pub enum PortError {
    /// Network or server hiccup that is worth retrying.
    #[error("Transient transport failure: {0}")]
    TransientTransport(String),
    /// The data could not be obtained this run.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),
    /// Credentials are missing, empty, or were rejected.
    #[error("Authentication failed: {0}")]
    AuthFailure(String),
    /// The response did not have the expected shape or content.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// The service understood the request but refused it.
    #[error("Rejected by service (code {code}): {message}")]
    Rejected {
        /// Service-specific error code.
        code: i64,
        /// Service-provided message.
        message: String,
    },
    /// Non-retryable network layer failure.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
}

impl PortError {
    /// Whether the failure may succeed when the request is repeated.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::TransientTransport(_))
    }

    /// Whether the failure means "no data this run" for a source.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            PortError::SourceUnavailable(_) | PortError::MalformedResponse(_)
        )
    }
}

#[derive(Clone, PartialEq, Eq)]
/// Bearer-style access token for token-gated channels.
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a token returned by an auth endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::AuthFailure`] when the token is empty.
    pub fn new<S: Into<String>>(token: S) -> Result<Self, PortError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(PortError::AuthFailure("empty access token".to_owned()));
        }
        Ok(Self(token))
    }

    /// Raw token value for request construction.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("AccessToken(***)")
    }
}

#[async_trait]
/// Provider of air-quality readings and forecasts.
pub trait AirQualitySource: Send + Sync {
    /// Fetch the reading published for `city` at `time_point`.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the provider fails or does not list the city.
    async fn reading(
        &self,
        city: &str,
        time_point: NaiveDateTime,
    ) -> Result<PollutionReading, PortError>;

    /// Fetch the multi-day forecast for `city`, oldest day first.
    ///
    /// An empty vector means the provider has no forecast.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the provider fails or the payload is inconsistent.
    async fn forecast(&self, city: &str) -> Result<Vec<ForecastEntry>, PortError>;
}

#[async_trait]
/// Calendar service answering workday and holiday questions.
pub trait DayClassifier: Send + Sync {
    /// Classify a single date.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the calendar cannot be consulted.
    async fn classify(&self, date: NaiveDate) -> Result<DayKind, PortError>;
}

#[async_trait]
/// Channel delivering one report to a shared endpoint that fans out to subscribers.
pub trait BroadcastChannel: Send + Sync {
    /// Publish the report.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the channel does not acknowledge the report.
    async fn publish(&self, report: &Report) -> Result<(), PortError>;
}

#[async_trait]
/// Token-gated channel delivering template messages to individual recipients.
pub trait TemplateChannel: Send + Sync {
    /// Obtain an access token for the following sends.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::AuthFailure`] when credentials are rejected or the token is empty.
    async fn access_token(&self) -> Result<AccessToken, PortError>;

    /// Send one message to one recipient.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the message is not accepted.
    async fn send(
        &self,
        token: &AccessToken,
        recipient: &RecipientId,
        message: &TemplateMessage,
    ) -> Result<(), PortError>;
}

#[async_trait]
/// Social platform listing the accounts following the notifier.
pub trait FollowerSource: Send + Sync {
    /// List every follower identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::AuthFailure`] when no usable token could be obtained,
    /// or another [`PortError`] when the listing fails.
    async fn followers(&self) -> Result<Vec<String>, PortError>;
}
