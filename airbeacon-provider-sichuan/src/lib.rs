//! Air-quality source for the Sichuan Department of Ecology and Environment publishing API.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use reqwest::header::{ACCEPT_LANGUAGE, ORIGIN, REFERER};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::debug;

use airbeacon_core::{
    model::{ForecastEntry, PollutionReading},
    ports::{AirQualitySource, PortError},
    transport::{RetryPolicy, fetch_json},
};

/// Public host of the provincial API.
pub const DEFAULT_BASE_URL: &str = "https://xn.prd.sumztech.com:65205";
/// Attribution for reports built from this source.
pub const SOURCE_LABEL: &str = "Sichuan Department of Ecology and Environment";

const DAILY_PATH: &str = "/api/airprovinceproduct/app-api/CityPublish/FindAirDay";
const FORECAST_PATH: &str = "/api/south-west/magic/artificial_forecast/city/list";

// The API only answers requests that look like they come from the portal.
const PORTAL_ORIGIN: &str = "https://sthjt.sc.gov.cn";
const PORTAL_REFERER: &str = "https://sthjt.sc.gov.cn/";

const TIME_POINT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const UNKNOWN_POLLUTANT: &str = "-";

/// Response from the daily publication endpoint.
#[derive(Debug, Deserialize)]
struct DailyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Vec<CityDaily>,
}

/// One city in the daily publication.
#[derive(Debug, Deserialize)]
struct CityDaily {
    name: String,
    aqi: Option<Number>,
    pollu: Option<String>,
}

/// Response from the forecast endpoint.
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    ret: i64,
    #[serde(default)]
    data: Vec<CityForecast>,
}

/// Parallel arrays, one slot per forecast day.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CityForecast {
    city_name: String,
    #[serde(default)]
    forecast_time: Vec<i64>, // epoch milliseconds
    #[serde(default)]
    aqi_min: Vec<Number>,
    #[serde(default)]
    aqi_max: Vec<Number>,
    #[serde(default)]
    aqi_level: Vec<Option<String>>,
    #[serde(default)]
    primary_pollutant: Vec<Option<String>>,
}

/// The API mixes numbers and numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Number {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Number {
    fn to_index(&self) -> Option<u32> {
        match self {
            Number::Int(value) => u32::try_from(*value).ok(),
            Number::Float(value) => float_index(*value),
            Number::Text(text) => {
                let text = text.trim();
                text.parse::<u32>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().and_then(float_index))
            }
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "range is checked before the cast"
)]
fn float_index(value: f64) -> Option<u32> {
    (value.is_finite() && (0.0..=f64::from(u32::MAX)).contains(&value))
        .then(|| value.round() as u32)
}

/// Air-quality source for one provincial API deployment.
pub struct SichuanAirSource {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    offset: FixedOffset,
}

impl SichuanAirSource {
    /// Create a source bound to the given HTTP client.
    ///
    /// `offset` is the civil time used to turn forecast timestamps into dates.
    #[must_use]
    pub fn new<S: Into<String>>(
        client: Client,
        base_url: S,
        retry: RetryPolicy,
        offset: FixedOffset,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            retry,
            offset,
        }
    }

    fn portal_headers(req: RequestBuilder) -> RequestBuilder {
        req.header(ORIGIN, PORTAL_ORIGIN)
            .header(REFERER, PORTAL_REFERER)
            .header(ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9")
    }
}

#[async_trait]
impl AirQualitySource for SichuanAirSource {
    async fn reading(
        &self,
        city: &str,
        time_point: NaiveDateTime,
    ) -> Result<PollutionReading, PortError> {
        let time_point_param = time_point.format(TIME_POINT_FORMAT).to_string();
        debug!(%city, time_point = %time_point_param, "requesting daily publication");

        let req = Self::portal_headers(
            self.client
                .post(format!("{}{DAILY_PATH}", self.base_url))
                .form(&[("timePoint", time_point_param.as_str())]),
        );
        let daily = fetch_json::<DailyResponse>(req, &self.retry).await?;

        pick_city(daily, city, time_point.date())
    }

    async fn forecast(&self, city: &str) -> Result<Vec<ForecastEntry>, PortError> {
        let req = Self::portal_headers(
            self.client
                .get(format!("{}{FORECAST_PATH}", self.base_url)),
        );
        let forecast = fetch_json::<ForecastResponse>(req, &self.retry).await?;

        pick_forecast(forecast, city, self.offset)
    }
}

fn pick_city(
    daily: DailyResponse,
    city: &str,
    observed_date: NaiveDate,
) -> Result<PollutionReading, PortError> {
    if !daily.success {
        return Err(PortError::SourceUnavailable(
            "daily publication reported failure".into(),
        ));
    }

    let entry = daily
        .result
        .into_iter()
        .find(|entry| entry.name == city)
        .ok_or_else(|| PortError::MalformedResponse(format!("{city} missing from daily publication")))?;

    let index = entry
        .aqi
        .as_ref()
        .and_then(Number::to_index)
        .ok_or_else(|| PortError::MalformedResponse(format!("no usable AQI for {city}")))?;

    Ok(PollutionReading {
        city_name: entry.name,
        index,
        dominant_pollutant: non_empty(entry.pollu),
        observed_date,
    })
}

fn pick_forecast(
    forecast: ForecastResponse,
    city: &str,
    offset: FixedOffset,
) -> Result<Vec<ForecastEntry>, PortError> {
    if forecast.ret != 0 {
        return Err(PortError::SourceUnavailable(format!(
            "forecast endpoint returned ret={}",
            forecast.ret
        )));
    }

    let city_forecast = forecast
        .data
        .into_iter()
        .find(|entry| entry.city_name == city)
        .ok_or_else(|| PortError::MalformedResponse(format!("{city} missing from forecast")))?;

    let days = city_forecast.forecast_time.len();
    let lengths = [
        city_forecast.aqi_min.len(),
        city_forecast.aqi_max.len(),
        city_forecast.aqi_level.len(),
        city_forecast.primary_pollutant.len(),
    ];
    if lengths.iter().any(|len| *len != days) {
        return Err(PortError::MalformedResponse(format!(
            "forecast arrays disagree in length: {days} timestamps vs {lengths:?}"
        )));
    }

    let mut entries = city_forecast
        .forecast_time
        .into_iter()
        .zip(city_forecast.aqi_min)
        .zip(city_forecast.aqi_max)
        .zip(city_forecast.aqi_level)
        .zip(city_forecast.primary_pollutant)
        .map(|((((millis, min), max), level), pollutant)| -> Result<ForecastEntry, PortError> {
            let date = DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| PortError::MalformedResponse(format!("bad timestamp {millis}")))?
                .with_timezone(&offset)
                .date_naive();
            let bound = |value: &Number| {
                value
                    .to_index()
                    .ok_or_else(|| PortError::MalformedResponse(format!("bad forecast AQI on {date}")))
            };
            Ok(ForecastEntry {
                date,
                index_min: bound(&min)?,
                index_max: bound(&max)?,
                level: non_empty(level),
                dominant_pollutant: non_empty(pollutant),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    entries.sort_by_key(|entry| entry.date);
    Ok(entries)
}

fn non_empty(value: Option<String>) -> String {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| UNKNOWN_POLLUTANT.to_owned())
}
