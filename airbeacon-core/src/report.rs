//! Markdown rendering of the daily air-quality and restriction report.

use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::model::{ForecastEntry, PollutionReading, Report, RestrictionDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Qualitative air quality tier, independent of the restriction warning levels.
pub enum AqiTier {
    /// Index up to 50.
    Good,
    /// Index up to 100.
    Moderate,
    /// Index up to 150.
    LightlyPolluted,
    /// Index up to 200.
    ModeratelyPolluted,
    /// Index above 200.
    HeavilyPolluted,
}

impl AqiTier {
    /// Tier for an air quality index.
    #[must_use]
    pub fn from_index(index: u32) -> Self {
        match index {
            0..=50 => Self::Good,
            51..=100 => Self::Moderate,
            101..=150 => Self::LightlyPolluted,
            151..=200 => Self::ModeratelyPolluted,
            _ => Self::HeavilyPolluted,
        }
    }

    /// Plain label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            AqiTier::Good => "good",
            AqiTier::Moderate => "moderate",
            AqiTier::LightlyPolluted => "lightly polluted",
            AqiTier::ModeratelyPolluted => "moderately polluted",
            AqiTier::HeavilyPolluted => "heavily polluted",
        }
    }

    /// Colored marker shown next to the label.
    #[must_use]
    pub fn emoji(self) -> &'static str {
        match self {
            AqiTier::Good => "🟢",
            AqiTier::Moderate => "🟡",
            AqiTier::LightlyPolluted => "🟠",
            AqiTier::ModeratelyPolluted => "🔴",
            AqiTier::HeavilyPolluted => "🟣",
        }
    }
}

impl fmt::Display for AqiTier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} {}", self.emoji(), self.label())
    }
}

/// English display name of a weekday.
#[must_use]
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Renders reports; holds the attribution shown in the footer.
#[derive(Debug, Clone)]
pub struct ReportFormatter {
    source_label: String,
}

impl ReportFormatter {
    /// Create a formatter crediting `source_label` in every report.
    #[must_use]
    pub fn new<S: Into<String>>(source_label: S) -> Self {
        Self {
            source_label: source_label.into(),
        }
    }

    /// Attribution shown in the footer.
    #[must_use]
    pub fn source_label(&self) -> &str {
        &self.source_label
    }

    /// Render the report for `evaluation_date`. The forecast table is omitted when
    /// `forecast` is empty.
    #[must_use]
    pub fn render(
        &self,
        reading: &PollutionReading,
        descriptor: &RestrictionDescriptor,
        forecast: &[ForecastEntry],
        evaluation_date: NaiveDate,
    ) -> Report {
        let title = format!(
            "🐼 {} air quality & traffic restriction daily ({evaluation_date})",
            reading.city_name
        );
        let body = ReportBody {
            reading,
            descriptor,
            forecast,
            evaluation_date,
            source_label: &self.source_label,
        }
        .to_string();

        Report { title, body }
    }
}

struct ReportBody<'report> {
    reading: &'report PollutionReading,
    descriptor: &'report RestrictionDescriptor,
    forecast: &'report [ForecastEntry],
    evaluation_date: NaiveDate,
    source_label: &'report str,
}

impl fmt::Display for ReportBody<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reading = self.reading;
        writeln!(
            out,
            "### 📊 {} current reading (observed {})",
            reading.city_name, reading.observed_date
        )?;
        writeln!(
            out,
            "- **AQI**: `{}` ({})",
            reading.index,
            AqiTier::from_index(reading.index)
        )?;
        writeln!(out, "- **Dominant pollutant**: `{}`", reading.dominant_pollutant)?;
        writeln!(out)?;

        writeln!(
            out,
            "### 🚗 Traffic restriction for {} ({})",
            self.evaluation_date,
            weekday_name(self.evaluation_date.weekday())
        )?;
        writeln!(out, "{}", self.descriptor.rule_text)?;
        writeln!(out)?;

        if !self.forecast.is_empty() {
            writeln!(out, "### 📈 {}-day forecast", self.forecast.len())?;
            writeln!(out, "| Date | Weekday | AQI range | Level | Pollutant |")?;
            writeln!(out, "| :--- | :--- | :--- | :--- | :--- |")?;
            for entry in self.forecast {
                writeln!(
                    out,
                    "| {} | {} | {}-{} | {} | {} |",
                    entry.date.format("%m-%d"),
                    weekday_name(entry.date.weekday()),
                    entry.index_min,
                    entry.index_max,
                    entry.level,
                    entry.dominant_pollutant
                )?;
            }
            writeln!(out)?;
        }

        write!(out, "---\n*Data source: {}*", self.source_label)
    }
}
