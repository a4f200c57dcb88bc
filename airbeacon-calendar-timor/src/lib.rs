//! Day classifier for mainland China's statutory calendar, using the timor.tech holiday API.
//!
//! The API knows about public holidays and the weekend days that are turned into
//! working days to compensate for them, which a plain weekday check cannot.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use airbeacon_core::{
    model::DayKind,
    ports::{DayClassifier, PortError},
    transport::{RetryPolicy, fetch_json},
};

/// Public host of the holiday API.
pub const DEFAULT_BASE_URL: &str = "https://timor.tech";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Response from /api/holiday/info/{date}
#[derive(Debug, Deserialize)]
struct InfoResponse {
    code: i64,
    #[serde(rename = "type")]
    day_type: Option<DayType>,
    // "holiday" carries the festival name and wage multiplier; not needed
}

#[derive(Debug, Deserialize)]
struct DayType {
    #[serde(rename = "type")]
    kind: u8, // 0 workday, 1 weekend, 2 holiday, 3 make-up workday
}

/// Classifier querying one date at a time.
pub struct TimorClassifier {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl TimorClassifier {
    /// Create a classifier bound to the given HTTP client.
    #[must_use]
    pub fn new<S: Into<String>>(client: Client, base_url: S, retry: RetryPolicy) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            retry,
        }
    }
}

#[async_trait]
impl DayClassifier for TimorClassifier {
    async fn classify(&self, date: NaiveDate) -> Result<DayKind, PortError> {
        let url = format!(
            "{}/api/holiday/info/{}",
            self.base_url,
            date.format(DATE_FORMAT)
        );
        let info = fetch_json::<InfoResponse>(self.client.get(url), &self.retry).await?;
        let day = map_info(&info)?;
        debug!(%date, ?day, "day classified");
        Ok(day)
    }
}

fn map_info(info: &InfoResponse) -> Result<DayKind, PortError> {
    if info.code != 0 {
        return Err(PortError::SourceUnavailable(format!(
            "holiday API returned code {}",
            info.code
        )));
    }

    let kind = info
        .day_type
        .as_ref()
        .ok_or_else(|| PortError::MalformedResponse("missing day type".into()))?
        .kind;

    match kind {
        0 | 3 => Ok(DayKind::WORKDAY),
        1 => Ok(DayKind::WEEKEND),
        2 => Ok(DayKind::HOLIDAY),
        other => Err(PortError::MalformedResponse(format!("unknown day type {other}"))),
    }
}
