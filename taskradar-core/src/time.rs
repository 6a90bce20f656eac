//! Time utilities: timezone-aware parsing and calendar windows.
//!
//! Everything is stored in UTC; local time only matters when reading user
//! input and when deciding where a day, week or month begins.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{CoreError, CoreResult};

pub fn parse_timezone(name: &str) -> CoreResult<Tz> {
    name.parse()
        .map_err(|_| CoreError::validation(format!("invalid timezone: {name}")))
}

/// Parse "2026-02-20 23:59" (or a bare "2026-02-20", read as midnight) in `tz`,
/// returning UTC.
pub fn parse_local_datetime(local: &str, tz: Tz) -> CoreResult<DateTime<Utc>> {
    let local = local.trim();
    let ndt = match NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M") {
        Ok(ndt) => ndt,
        Err(e) => NaiveDate::parse_from_str(local, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| CoreError::validation(format!("invalid local datetime '{local}': {e}")))?,
    };

    let local_dt = tz.from_local_datetime(&ndt).single().ok_or_else(|| {
        CoreError::validation(format!("ambiguous or invalid local time (DST?): {local} {tz}"))
    })?;

    Ok(local_dt.with_timezone(&Utc))
}

/// Calendar date of `at` as seen in `tz`.
pub fn local_date(at: DateTime<Utc>, tz: Tz) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// First instant of `date` in `tz`.
pub fn start_of_day(date: NaiveDate, tz: Tz) -> CoreResult<DateTime<Utc>> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| CoreError::validation(format!("invalid date {date}")))?;
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CoreError::validation(format!("{date} has no local midnight in {tz}")))
}

/// `[start of date, start of next day)`.
pub fn day_window(date: NaiveDate, tz: Tz) -> CoreResult<(DateTime<Utc>, DateTime<Utc>)> {
    let next = date
        .succ_opt()
        .ok_or_else(|| CoreError::validation(format!("date {date} out of range")))?;
    Ok((start_of_day(date, tz)?, start_of_day(next, tz)?))
}

/// Monday-to-Monday window containing `date`.
pub fn week_window(date: NaiveDate, tz: Tz) -> CoreResult<(DateTime<Utc>, DateTime<Utc>)> {
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    let next_monday = monday + Duration::days(7);
    Ok((start_of_day(monday, tz)?, start_of_day(next_monday, tz)?))
}

pub fn month_window(year: i32, month: u32, tz: Tz) -> CoreResult<(DateTime<Utc>, DateTime<Utc>)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| CoreError::validation(format!("invalid month {year}-{month:02}")))?;
    let next = first
        .checked_add_months(Months::new(1))
        .ok_or_else(|| CoreError::validation(format!("month {year}-{month:02} out of range")))?;
    Ok((start_of_day(first, tz)?, start_of_day(next, tz)?))
}
