use crate::error::{AnalyticsError, Result};
use chrono::{Datelike, Days, Months, NaiveDate};

pub fn first_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        AnalyticsError::DateError(format!("Invalid year/month: {}-{:02}", year, month))
    })
}

pub fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    first_day_of_month(next_year, next_month)?
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| {
            AnalyticsError::DateError(format!("No last day for {}-{:02}", year, month))
        })
}

/// Truncates a date to the first day of its month.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Adds (or subtracts, for negative `months`) whole calendar months.
pub fn add_months(date: NaiveDate, months: i32) -> Result<NaiveDate> {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months as u32))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    };

    shifted.ok_or_else(|| {
        AnalyticsError::DateError(format!("Cannot shift {} by {} months", date, months))
    })
}

/// "YYYY-MM" key used for monthly buckets.
pub fn period_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Parses "YYYY-MM" or "YYYY-MM-DD" and returns the first day of that month.
pub fn parse_month(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();

    let parsed = match trimmed.len() {
        7 => NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d"),
        10 => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"),
        _ => {
            return Err(AnalyticsError::DateError(format!(
                "Invalid date '{}'. Expected YYYY-MM or YYYY-MM-DD",
                value
            )))
        }
    };

    parsed.map(month_start).map_err(|_| {
        AnalyticsError::DateError(format!(
            "Invalid date '{}'. Expected YYYY-MM or YYYY-MM-DD",
            value
        ))
    })
}

/// Unix timestamp (seconds, UTC midnight) for a calendar date.
pub fn timestamp_of(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}
