//! In-memory fake ports that record calls, for tests.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;

use crate::model::{DayKind, ForecastEntry, PollutionReading, RecipientId, Report, TemplateMessage};
use crate::ports::{
    AccessToken, AirQualitySource, BroadcastChannel, DayClassifier, FollowerSource, PortError,
    TemplateChannel,
};

/// Constructor of the error a fake should return, e.g. `PortError::SourceUnavailable`.
pub type ErrorFn = fn(String) -> PortError;

type Scripted<T> = Result<T, (ErrorFn, String)>;

fn replay<T: Clone>(scripted: &Scripted<T>) -> Result<T, PortError> {
    match scripted {
        Ok(value) => Ok(value.clone()),
        Err((make, message)) => Err(make(message.clone())),
    }
}

struct FakeSourceState {
    reading: Scripted<PollutionReading>,
    forecast: Scripted<Vec<ForecastEntry>>,
    reading_calls: Vec<(String, NaiveDateTime)>,
    forecast_calls: usize,
}

/// Fake air-quality source returning scripted results.
#[derive(Clone)]
pub struct FakeSource {
    inner: Arc<Mutex<FakeSourceState>>,
}

impl FakeSource {
    /// Source returning `reading` and an empty forecast.
    #[must_use]
    pub fn new(reading: PollutionReading) -> Self {
        Self::scripted(Ok(reading))
    }

    /// Source whose reading fetch fails with [`PortError::SourceUnavailable`].
    #[must_use]
    pub fn unavailable(message: &str) -> Self {
        let make: ErrorFn = PortError::SourceUnavailable;
        Self::scripted(Err((make, message.to_owned())))
    }

    fn scripted(reading: Scripted<PollutionReading>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeSourceState {
                reading,
                forecast: Ok(Vec::new()),
                reading_calls: Vec::new(),
                forecast_calls: 0,
            })),
        }
    }

    /// Return `entries` from the forecast fetch.
    #[must_use]
    pub fn with_forecast(self, entries: Vec<ForecastEntry>) -> Self {
        self.inner.lock().forecast = Ok(entries);
        self
    }

    /// Fail the forecast fetch.
    #[must_use]
    pub fn failing_forecast(self, make: ErrorFn, message: &str) -> Self {
        self.inner.lock().forecast = Err((make, message.to_owned()));
        self
    }

    /// Replace the reading returned by later fetches.
    pub fn set_reading(&self, reading: PollutionReading) {
        self.inner.lock().reading = Ok(reading);
    }

    /// Recorded reading requests.
    #[must_use]
    pub fn reading_calls(&self) -> Vec<(String, NaiveDateTime)> {
        self.inner.lock().reading_calls.clone()
    }

    /// Number of forecast requests.
    #[must_use]
    pub fn forecast_calls(&self) -> usize {
        self.inner.lock().forecast_calls
    }
}

#[async_trait]
impl AirQualitySource for FakeSource {
    async fn reading(
        &self,
        city: &str,
        time_point: NaiveDateTime,
    ) -> Result<PollutionReading, PortError> {
        let mut state = self.inner.lock();
        state.reading_calls.push((city.to_owned(), time_point));
        replay(&state.reading)
    }

    async fn forecast(&self, _city: &str) -> Result<Vec<ForecastEntry>, PortError> {
        let mut state = self.inner.lock();
        state.forecast_calls += 1;
        replay(&state.forecast)
    }
}

/// Fake calendar with a fixed answer, or always unreachable.
#[derive(Clone)]
pub struct FakeClassifier {
    answer: Option<DayKind>,
}

impl FakeClassifier {
    /// Classifier answering `day` for every date.
    #[must_use]
    pub fn fixed(day: DayKind) -> Self {
        Self { answer: Some(day) }
    }

    /// Classifier that always fails.
    #[must_use]
    pub fn unreachable() -> Self {
        Self { answer: None }
    }
}

#[async_trait]
impl DayClassifier for FakeClassifier {
    async fn classify(&self, date: NaiveDate) -> Result<DayKind, PortError> {
        self.answer
            .ok_or_else(|| PortError::SourceUnavailable(format!("calendar offline for {date}")))
    }
}

/// Fake broadcast channel recording published reports.
#[derive(Clone, Default)]
pub struct FakeBroadcast {
    published: Arc<Mutex<Vec<Report>>>,
    failure: Option<String>,
}

impl FakeBroadcast {
    /// Channel accepting every report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel rejecting every report with `reason`.
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_owned()),
            ..Self::default()
        }
    }

    /// Reports seen so far, including failed ones.
    #[must_use]
    pub fn published(&self) -> Vec<Report> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl BroadcastChannel for FakeBroadcast {
    async fn publish(&self, report: &Report) -> Result<(), PortError> {
        self.published.lock().push(report.clone());
        match &self.failure {
            Some(reason) => Err(PortError::SourceUnavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Fake template channel recording successful sends.
#[derive(Clone)]
pub struct FakeTemplateChannel {
    sent: Arc<Mutex<Vec<(RecipientId, TemplateMessage)>>>,
    failing: BTreeSet<String>,
    token: String,
}

impl Default for FakeTemplateChannel {
    fn default() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            failing: BTreeSet::new(),
            token: String::from("fake-token"),
        }
    }
}

impl FakeTemplateChannel {
    /// Channel accepting every recipient.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject sends to `recipient`.
    #[must_use]
    pub fn fail_for(mut self, recipient: &str) -> Self {
        self.failing.insert(recipient.to_owned());
        self
    }

    /// Make the token endpoint hand out an empty token.
    #[must_use]
    pub fn without_token(mut self) -> Self {
        self.token = String::new();
        self
    }

    /// Messages accepted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<(RecipientId, TemplateMessage)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl TemplateChannel for FakeTemplateChannel {
    async fn access_token(&self) -> Result<AccessToken, PortError> {
        AccessToken::new(self.token.clone())
    }

    async fn send(
        &self,
        _token: &AccessToken,
        recipient: &RecipientId,
        message: &TemplateMessage,
    ) -> Result<(), PortError> {
        if self.failing.contains(&recipient.0) {
            return Err(PortError::Rejected {
                code: 43004,
                message: String::from("require subscribe"),
            });
        }
        self.sent.lock().push((recipient.clone(), message.clone()));
        Ok(())
    }
}

/// Fake follower API.
pub struct FakeFollowers {
    result: Mutex<Option<Result<Vec<String>, PortError>>>,
}

impl FakeFollowers {
    /// API listing `ids`.
    #[must_use]
    pub fn with<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            result: Mutex::new(Some(Ok(ids.into_iter().map(Into::into).collect()))),
        }
    }

    /// API failing once with `err`.
    #[must_use]
    pub fn failing(err: PortError) -> Self {
        Self {
            result: Mutex::new(Some(Err(err))),
        }
    }
}

#[async_trait]
impl FollowerSource for FakeFollowers {
    async fn followers(&self) -> Result<Vec<String>, PortError> {
        let mut slot = self.result.lock();
        match slot.take() {
            Some(Ok(ids)) => {
                *slot = Some(Ok(ids.clone()));
                Ok(ids)
            }
            Some(Err(err)) => Err(err),
            None => Err(PortError::SourceUnavailable(String::from("already failed"))),
        }
    }
}
