//! Calendar sampling frequencies and date bucketing.
//!
//! A `None` frequency (`Option<Frequency>`) means raw data with irregular spacing. Raw is
//! considered finer than every calendar frequency.

use std::str::FromStr;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::error::SummaryError;

/// Supported calendar sampling frequencies
///
/// Variants are declared from finest to coarsest, the derived ordering is the calendar order
/// `Daily < Weekly < Monthly < Quarterly < Yearly`.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl FromStr for Frequency {
    type Err = SummaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            "yearly" => Ok(Frequency::Yearly),
            _ => Err(SummaryError::UnsupportedFrequency {
                frequency: s.to_string(),
            }),
        }
    }
}

/// Parse a frequency where `raw` (or an empty string) means no resampling.
pub fn parse_optional_frequency(s: &str) -> Result<Option<Frequency>, SummaryError> {
    match s.to_ascii_lowercase().as_str() {
        "" | "raw" => Ok(None),
        other => other.parse().map(Some),
    }
}

/// Display helper for optional frequencies.
pub fn frequency_name(frequency: Option<Frequency>) -> String {
    frequency.map_or_else(|| "raw".to_string(), |f| f.to_string())
}

/// Returns true if `a` is the same as or finer than `b`.
pub fn frequency_leq(a: Frequency, b: Frequency) -> bool {
    a <= b
}

/// Returns true if `a` is the same as or coarser than `b`.
pub fn frequency_gte(a: Frequency, b: Frequency) -> bool {
    a >= b
}

/// Returns true if `output` is strictly finer than `input`.
///
/// Raw data (`None`) is finer than any calendar frequency.
pub fn is_finer(output: Option<Frequency>, input: Option<Frequency>) -> bool {
    output < input
}

/// Returns true if every `coarse` bucket start is also a `fine` bucket start.
///
/// Weeks only refine themselves and days refine everything.
pub fn is_refinement(fine: Frequency, coarse: Frequency) -> bool {
    match (fine, coarse) {
        (Frequency::Daily, _) => true,
        (Frequency::Weekly, coarse) => coarse == Frequency::Weekly,
        (fine, Frequency::Weekly) => fine == Frequency::Weekly,
        (fine, coarse) => fine <= coarse,
    }
}

/// Canonical bucket label of a date at a frequency.
///
/// Weekly labels use the ISO week-year, so 2021-01-01 is labelled `2020-W53`.
pub fn bucket_label(date: NaiveDateTime, frequency: Option<Frequency>) -> String {
    match frequency {
        Some(Frequency::Daily) => date.format("%Y-%m-%d").to_string(),
        Some(Frequency::Weekly) => {
            let week = date.iso_week();
            format!("{:04}-W{:02}", week.year(), week.week())
        }
        Some(Frequency::Monthly) => date.format("%Y-%m").to_string(),
        Some(Frequency::Quarterly) => format!("{:04}-Q{}", date.year(), 1 + date.month0() / 3),
        Some(Frequency::Yearly) => format!("{:04}", date.year()),
        None => date.format("%Y-%m-%dT%H:%M:%S").to_string(),
    }
}

fn first_day_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).expect("first day of a month is always valid")
}

/// Start of the bucket containing `date`.
pub fn normalize_date_floor(date: NaiveDateTime, frequency: Frequency) -> NaiveDateTime {
    let day = date.date();
    let start = match frequency {
        Frequency::Daily => day,
        Frequency::Weekly => {
            day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
        }
        Frequency::Monthly => first_day_of_month(day.year(), day.month()),
        Frequency::Quarterly => first_day_of_month(day.year(), 3 * (day.month0() / 3) + 1),
        Frequency::Yearly => first_day_of_month(day.year(), 1),
    };
    start.and_time(NaiveTime::MIN)
}

/// Smallest bucket start at or after `date`.
pub fn normalize_date_ceil(date: NaiveDateTime, frequency: Frequency) -> NaiveDateTime {
    let floor = normalize_date_floor(date, frequency);
    if floor == date {
        date
    } else {
        add_periods(floor, frequency, 1)
    }
}

/// Returns true if `date` is a bucket start.
pub fn is_on_boundary(date: NaiveDateTime, frequency: Frequency) -> bool {
    normalize_date_floor(date, frequency) == date
}

/// Step `date` forward by `n` periods.
pub fn add_periods(date: NaiveDateTime, frequency: Frequency, n: u32) -> NaiveDateTime {
    match frequency {
        Frequency::Daily => date + Duration::days(i64::from(n)),
        Frequency::Weekly => date + Duration::weeks(i64::from(n)),
        Frequency::Monthly => date + Months::new(n),
        Frequency::Quarterly => date + Months::new(3 * n),
        Frequency::Yearly => date + Months::new(12 * n),
    }
}

/// Every bucket start from `floor(min_date)` up to and including `ceil(max_date)`.
///
/// # Arguments
///
/// * `min_date`: Earliest raw date
/// * `max_date`: Latest raw date
/// * `frequency`: Sampling frequency
pub fn generate_normalized_sample_dates(
    min_date: NaiveDateTime,
    max_date: NaiveDateTime,
    frequency: Frequency,
) -> Vec<NaiveDateTime> {
    let start = normalize_date_floor(min_date, frequency);
    let end = normalize_date_ceil(max_date, frequency);
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        dates.push(current);
        current = add_periods(current, frequency, 1);
    }
    dates
}
