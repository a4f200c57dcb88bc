//! Chengdu traffic restriction rules derived from the air quality index and the calendar.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};

use crate::model::{DayKind, PlateRule, RestrictionDescriptor, TimeWindow, WarningLevel};
use crate::report::weekday_name;

const ALERT_SCOPE: &str = "within the fourth ring road";

/// Tail-digit rotation keyed by ISO weekday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailDigitTable {
    entries: BTreeMap<u32, String>,
}

impl TailDigitTable {
    /// Build a table from weekday/digits pairs. Weekdays without an entry have no rotation.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Weekday, S)>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(weekday, digits)| (weekday.number_from_monday(), digits.into()))
                .collect(),
        }
    }

    /// Restricted tail digits for the weekday, if any.
    #[must_use]
    pub fn digits_for(&self, weekday: Weekday) -> Option<&str> {
        self.entries
            .get(&weekday.number_from_monday())
            .map(String::as_str)
    }
}

impl Default for TailDigitTable {
    fn default() -> Self {
        Self::new([
            (Weekday::Mon, "1,6"),
            (Weekday::Tue, "2,7"),
            (Weekday::Wed, "3,8"),
            (Weekday::Thu, "4,9"),
            (Weekday::Fri, "5,0"),
        ])
    }
}

/// Derive the restriction in force on `date`.
///
/// Days off dominate every pollution-based rule. On working days the index selects a
/// warning level, and the level selects the rule.
#[must_use]
pub fn evaluate(
    index: u32,
    date: NaiveDate,
    day: DayKind,
    table: &TailDigitTable,
) -> RestrictionDescriptor {
    if day.is_day_off() {
        return no_restriction("holiday/weekend");
    }

    let weekday = date.weekday();
    let digits = table.digits_for(weekday);

    match WarningLevel::from_index(index) {
        WarningLevel::Red => red_alert(),
        level @ (WarningLevel::Orange | WarningLevel::Yellow) => pollution_alert(level, digits),
        WarningLevel::None => match digits {
            Some(digits) => regular(digits),
            None => no_restriction(&format!(
                "no tail-digit rotation on {}",
                weekday_name(weekday)
            )),
        },
    }
}

fn no_restriction(reason: &str) -> RestrictionDescriptor {
    RestrictionDescriptor {
        warning_level: WarningLevel::None,
        time_window: TimeWindow::Unrestricted,
        plate_rule: PlateRule::Unrestricted,
        includes_trucks: false,
        scope: None,
        rule_text: format!("🚗 no restriction ({reason})"),
    }
}

fn red_alert() -> RestrictionDescriptor {
    RestrictionDescriptor {
        warning_level: WarningLevel::Red,
        time_window: TimeWindow::FullDay,
        plate_rule: PlateRule::OddEven,
        includes_trucks: false,
        scope: None,
        rule_text: String::from(
            "🚫 **Red alert restriction**\n  - **Time**: all day (24h)\n  - **Rule**: odd/even plate-number rotation",
        ),
    }
}

// Yellow and orange share one rule; only the label differs.
fn pollution_alert(level: WarningLevel, digits: Option<&str>) -> RestrictionDescriptor {
    let time_window = TimeWindow::Between {
        start: clock(6, 0),
        end: clock(22, 0),
    };
    let (badge, title) = if level == WarningLevel::Orange {
        ("🟠", "Orange")
    } else {
        ("🟡", "Yellow")
    };
    let (plate_rule, vehicles) = match digits {
        Some(digits) => (
            PlateRule::TailDigits(digits.to_owned()),
            format!("passenger cars (tail digits {digits}) and all trucks"),
        ),
        None => (
            PlateRule::Unrestricted,
            String::from("all trucks (no passenger-car rotation today)"),
        ),
    };

    RestrictionDescriptor {
        warning_level: level,
        time_window,
        plate_rule,
        includes_trucks: true,
        scope: Some(ALERT_SCOPE.to_owned()),
        rule_text: format!(
            "{badge} **{title} alert restriction**\n  - **Time**: **{time_window}**\n  - **Area**: roads {ALERT_SCOPE}\n  - **Rule**: {vehicles} are restricted"
        ),
    }
}

fn regular(digits: &str) -> RestrictionDescriptor {
    let time_window = TimeWindow::Between {
        start: clock(7, 30),
        end: clock(20, 0),
    };
    RestrictionDescriptor {
        warning_level: WarningLevel::None,
        time_window,
        plate_rule: PlateRule::TailDigits(digits.to_owned()),
        includes_trucks: false,
        scope: None,
        rule_text: format!(
            "✅ **Regular tail-digit restriction**\n  - **Time**: {time_window}\n  - **Rule**: tail digits {digits} are restricted"
        ),
    }
}

fn clock(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}
