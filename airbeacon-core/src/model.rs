//! Domain data structures for readings, forecasts, restrictions, and subscribers.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Daily air-quality reading for a single city.
pub struct PollutionReading {
    /// City name exactly as the provider reports it.
    pub city_name: String,
    /// Air quality index.
    pub index: u32,
    /// Dominant pollutant label, e.g. `PM2.5`.
    pub dominant_pollutant: String,
    /// Day the reading refers to.
    pub observed_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Forecast for a single upcoming day.
pub struct ForecastEntry {
    /// Forecast day.
    pub date: NaiveDate,
    /// Lower bound of the expected index.
    pub index_min: u32,
    /// Upper bound of the expected index.
    pub index_max: u32,
    /// Provider's qualitative level label.
    pub level: String,
    /// Expected dominant pollutant.
    pub dominant_pollutant: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// Heavy-pollution warning levels that drive traffic restrictions.
pub enum WarningLevel {
    /// No pollution warning in force.
    None,
    /// Yellow warning (index 101-150).
    Yellow,
    /// Orange warning (index 151-200).
    Orange,
    /// Red warning (index above 200).
    Red,
}

impl WarningLevel {
    /// Derive the warning level from an air quality index.
    #[must_use]
    pub fn from_index(index: u32) -> Self {
        match index {
            0..=100 => Self::None,
            101..=150 => Self::Yellow,
            151..=200 => Self::Orange,
            _ => Self::Red,
        }
    }
}

impl fmt::Display for WarningLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WarningLevel::None => "regular",
            WarningLevel::Yellow => "yellow alert",
            WarningLevel::Orange => "orange alert",
            WarningLevel::Red => "red alert",
        };
        write!(formatter, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Hours during which a restriction applies.
pub enum TimeWindow {
    /// Nothing is restricted.
    Unrestricted,
    /// The full 24 hours of the day.
    FullDay,
    /// A daytime window, start and end inclusive.
    Between {
        /// Window start.
        start: NaiveTime,
        /// Window end.
        end: NaiveTime,
    },
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeWindow::Unrestricted => write!(formatter, "none"),
            TimeWindow::FullDay => write!(formatter, "00:00-24:00"),
            TimeWindow::Between { start, end } => {
                write!(formatter, "{}-{}", start.format("%H:%M"), end.format("%H:%M"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Which license plates are kept off the road.
pub enum PlateRule {
    /// Passenger cars are not restricted.
    Unrestricted,
    /// Plates ending in one of the listed digits, e.g. `3,8`.
    TailDigits(String),
    /// Odd/even plate-number rotation.
    OddEven,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Traffic restriction in force for a given day.
pub struct RestrictionDescriptor {
    /// Pollution warning level the rule was derived from.
    pub warning_level: WarningLevel,
    /// Hours the rule applies.
    pub time_window: TimeWindow,
    /// Passenger-car plate rule.
    pub plate_rule: PlateRule,
    /// Whether trucks are restricted as well.
    pub includes_trucks: bool,
    /// Geographic scope, when narrower than the whole city.
    pub scope: Option<String>,
    /// Human-readable markdown description.
    pub rule_text: String,
}

impl RestrictionDescriptor {
    /// One-line summary suitable for template messages.
    #[must_use]
    pub fn summary(&self) -> String {
        let plates = match &self.plate_rule {
            PlateRule::Unrestricted => None,
            PlateRule::TailDigits(digits) => Some(format!("tail digits {digits}")),
            PlateRule::OddEven => Some(String::from("odd/even plates")),
        };
        let subject = match (plates, self.includes_trucks) {
            (None, false) => return String::from("no restriction"),
            (None, true) => String::from("trucks"),
            (Some(plates), true) => format!("{plates} and trucks"),
            (Some(plates), false) => plates,
        };
        format!(
            "{}: {subject} restricted {}",
            self.warning_level, self.time_window
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Calendar classification of a single day.
pub struct DayKind {
    /// Whether the day is a working day (including make-up working weekends).
    pub is_workday: bool,
    /// Whether the day is a public holiday.
    pub is_holiday: bool,
}

impl DayKind {
    /// Regular working day.
    pub const WORKDAY: Self = Self {
        is_workday: true,
        is_holiday: false,
    };
    /// Ordinary weekend day.
    pub const WEEKEND: Self = Self {
        is_workday: false,
        is_holiday: false,
    };
    /// Public holiday.
    pub const HOLIDAY: Self = Self {
        is_workday: false,
        is_holiday: true,
    };

    /// Classify purely by ISO weekday, used when no calendar is reachable.
    #[must_use]
    pub fn from_weekday(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Sat | Weekday::Sun => Self::WEEKEND,
            _ => Self::WORKDAY,
        }
    }

    /// Whether restrictions are lifted regardless of pollution.
    #[must_use]
    pub fn is_day_off(self) -> bool {
        self.is_holiday || !self.is_workday
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Rendered notification ready for delivery.
pub struct Report {
    /// Short title line.
    pub title: String,
    /// Markdown body.
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Value and display color of one template field.
pub struct TemplateField {
    /// Field text.
    pub value: String,
    /// Hex color such as `#FF0000`.
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Structured message sent to each recipient in template mode.
pub struct TemplateMessage {
    /// City name.
    pub city: TemplateField,
    /// Air quality index.
    pub index: TemplateField,
    /// Color-coded qualitative severity.
    pub severity: TemplateField,
    /// Restriction summary.
    pub restriction: TemplateField,
    /// Date the restriction applies to.
    pub date: TemplateField,
    /// Free-form remark.
    pub remark: TemplateField,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
/// Opaque identifier of a notification recipient.
pub struct RecipientId(pub String);

impl fmt::Display for RecipientId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
/// Set of recipients, persisted as a JSON array of identifiers.
pub struct SubscriberList(BTreeSet<RecipientId>);

impl SubscriberList {
    /// Build a list from raw identifiers, dropping duplicates.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(|id| RecipientId(id.into())).collect())
    }

    /// Number of recipients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list has no recipients.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over recipients in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = &RecipientId> {
        self.0.iter()
    }
}
