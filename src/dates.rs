use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime};

use crate::error::{PipelineError, PipelineResult};

const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parses a record date. Timestamps are truncated to their calendar date.
pub fn parse_date(raw: &str) -> PipelineResult<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(PipelineError::InvalidDate("empty date".to_string()));
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(stamp.date());
        }
    }

    DateTime::parse_from_rfc3339(value)
        .map(|stamp| stamp.date_naive())
        .map_err(|_| PipelineError::InvalidDate(value.to_string()))
}

/// Reference dates must be plain calendar dates.
pub fn parse_reference_date(raw: &str) -> PipelineResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| PipelineError::InvalidDate(raw.to_string()))
}

pub fn month_start(date: NaiveDate) -> PipelineResult<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
        .ok_or_else(|| PipelineError::InvalidDate(date.to_string()))
}

pub fn months_before(date: NaiveDate, months: u32) -> PipelineResult<NaiveDate> {
    date.checked_sub_months(Months::new(months))
        .ok_or_else(|| PipelineError::InvalidDate(format!("{date} minus {months} months")))
}

pub fn year_start(year: i32) -> PipelineResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| PipelineError::InvalidDate(format!("year {year}")))
}

/// Every calendar date in `[start, end]`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}
