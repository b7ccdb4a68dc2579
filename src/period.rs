use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};
use crate::models::DateRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    CurrentWeek,
    CurrentMonth,
    CurrentSemester,
    Custom,
}

impl FromStr for RangeKind {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "current_week" => Ok(Self::CurrentWeek),
            "current_month" => Ok(Self::CurrentMonth),
            "current_semester" => Ok(Self::CurrentSemester),
            "custom" => Ok(Self::Custom),
            other => Err(ReportError::validation(
                "date_range_type",
                format!("invalid date range type `{other}`"),
            )),
        }
    }
}

/// Turns a range kind plus optional custom bounds into a concrete range.
///
/// Weeks run Sunday through Saturday. Semesters are January–June and
/// July–December.
pub fn resolve(
    kind: RangeKind,
    start: Option<&str>,
    end: Option<&str>,
    today: NaiveDate,
) -> Result<DateRange> {
    match kind {
        RangeKind::CurrentWeek => {
            let offset = i64::from(today.weekday().num_days_from_sunday());
            let from = today - Duration::days(offset);
            DateRange::new(from, from + Duration::days(6))
        }
        RangeKind::CurrentMonth => {
            let from = first_of_month(today.year(), today.month())?;
            DateRange::new(from, last_of_month(today.year(), today.month())?)
        }
        RangeKind::CurrentSemester => {
            let (from, to) = if today.month() <= 6 {
                (ymd(today.year(), 1, 1)?, ymd(today.year(), 6, 30)?)
            } else {
                (ymd(today.year(), 7, 1)?, ymd(today.year(), 12, 31)?)
            };
            DateRange::new(from, to)
        }
        RangeKind::Custom => {
            let (Some(start), Some(end)) = (non_blank(start), non_blank(end)) else {
                return Err(ReportError::validation(
                    "date_range",
                    "please provide start and end dates for custom range",
                ));
            };
            DateRange::new(parse_date(start)?, parse_date(end)?)
        }
    }
}

/// Longest trailing window the analytics accept, roughly ten years.
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// First day of a trailing window of `days` days ending today.
pub fn cutoff_date(today: NaiveDate, days: i64) -> Result<NaiveDate> {
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(ReportError::validation(
            "days",
            format!("days must be between 1 and {MAX_WINDOW_DAYS}, got {days}"),
        ));
    }
    Duration::try_days(days)
        .and_then(|window| today.checked_sub_signed(window))
        .ok_or_else(|| {
            ReportError::validation("days", format!("{days} days before {today} is not a date"))
        })
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| ReportError::computation(format!("date `{value}`"), err))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn ymd(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        ReportError::validation("date_range", format!("{year}-{month}-{day} is not a date"))
    })
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    ymd(year, month, 1)
}

fn last_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Ok(first_of_month(next_year, next_month)? - Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn week_starts_on_sunday() {
        // 2024-09-18 is a Wednesday.
        let range = resolve(RangeKind::CurrentWeek, None, None, day(2024, 9, 18)).unwrap();
        assert_eq!(range.from, day(2024, 9, 15));
        assert_eq!(range.to, day(2024, 9, 21));

        let sunday = resolve(RangeKind::CurrentWeek, None, None, day(2024, 9, 15)).unwrap();
        assert_eq!(sunday.from, day(2024, 9, 15));
    }

    #[test]
    fn month_covers_leap_february() {
        let range = resolve(RangeKind::CurrentMonth, None, None, day(2024, 2, 10)).unwrap();
        assert_eq!(range.from, day(2024, 2, 1));
        assert_eq!(range.to, day(2024, 2, 29));

        let december = resolve(RangeKind::CurrentMonth, None, None, day(2024, 12, 3)).unwrap();
        assert_eq!(december.to, day(2024, 12, 31));
    }

    #[test]
    fn semester_splits_at_july() {
        let spring = resolve(RangeKind::CurrentSemester, None, None, day(2025, 6, 30)).unwrap();
        assert_eq!((spring.from, spring.to), (day(2025, 1, 1), day(2025, 6, 30)));

        let fall = resolve(RangeKind::CurrentSemester, None, None, day(2025, 7, 1)).unwrap();
        assert_eq!((fall.from, fall.to), (day(2025, 7, 1), day(2025, 12, 31)));
    }

    #[test]
    fn custom_requires_both_bounds() {
        let err = resolve(RangeKind::Custom, Some("2024-09-01"), None, day(2024, 9, 18))
            .unwrap_err();
        assert!(err.is_validation());

        let blank = resolve(RangeKind::Custom, Some("  "), Some("2024-09-02"), day(2024, 9, 18))
            .unwrap_err();
        assert!(blank.is_validation());
    }

    #[test]
    fn custom_rejects_inverted_range() {
        let err = resolve(
            RangeKind::Custom,
            Some("2024-09-10"),
            Some("2024-09-01"),
            day(2024, 9, 18),
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn malformed_custom_date_is_a_computation_failure() {
        let err = resolve(
            RangeKind::Custom,
            Some("2024-02-31"),
            Some("2024-03-01"),
            day(2024, 9, 18),
        )
        .unwrap_err();
        assert!(matches!(err, ReportError::Computation { .. }));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!("last_decade".parse::<RangeKind>().unwrap_err().is_validation());
    }

    #[test]
    fn cutoff_date_respects_days() {
        assert_eq!(cutoff_date(day(2024, 9, 18), 14).unwrap(), day(2024, 9, 4));
        assert_eq!(
            cutoff_date(day(2024, 9, 18), MAX_WINDOW_DAYS).unwrap(),
            day(2014, 9, 21)
        );
    }

    #[test]
    fn windows_outside_the_bounds_are_rejected() {
        for days in [0, -3, MAX_WINDOW_DAYS + 1, 100_000_000, i64::MAX, i64::MIN] {
            let err = cutoff_date(day(2024, 9, 18), days).unwrap_err();
            assert!(matches!(err, ReportError::Validation { field: "days", .. }), "{days}");
        }
    }

    #[test]
    fn window_reaching_before_the_calendar_is_rejected() {
        let err = cutoff_date(NaiveDate::MIN, 1).unwrap_err();
        assert!(err.is_validation());
    }
}
