//! Argument parsing helpers: human durations and local times.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use regex::Regex;

use taskradar_core::time::parse_local_datetime;

const DURATION_PATTERN: &str = r"^(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?$";

/// "90m", "2h", "1h30m", "1d", "1w" (or bare minutes) -> minutes.
pub fn parse_minutes(s: &str) -> Result<i32> {
    let s = s.trim().to_lowercase();
    if let Ok(n) = s.parse::<i32>() {
        return Ok(n);
    }

    let re = Regex::new(DURATION_PATTERN).context("duration pattern")?;
    let caps = re
        .captures(&s)
        .filter(|_| !s.is_empty())
        .with_context(|| format!("invalid duration '{s}' (try 90m, 2h, 1h30m, 1d)"))?;

    let mut minutes: i64 = 0;
    for (group, unit) in [(1, 7 * 24 * 60), (2, 24 * 60), (3, 60), (4, 1)] {
        if let Some(m) = caps.get(group) {
            let n: i64 = m.as_str().parse().context("duration number")?;
            minutes += n * unit;
        }
    }
    i32::try_from(minutes).with_context(|| format!("duration '{s}' is too long"))
}

/// "YYYY-MM-DD HH:MM" or "YYYY-MM-DD" in `tz`.
pub fn parse_time(s: &str, tz: Tz) -> Result<DateTime<Utc>> {
    Ok(parse_local_datetime(s, tz)?)
}

/// Local "YYYY-MM-DD HH:MM" for display.
pub fn format_local(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}' (expected YYYY-MM-DD)"))
}

/// "YYYY-MM" -> (year, month).
pub fn parse_month(s: &str) -> Result<(i32, u32)> {
    let Some((y, m)) = s.trim().split_once('-') else {
        bail!("invalid month '{s}' (expected YYYY-MM)");
    };
    let year = y.parse().with_context(|| format!("invalid year in '{s}'"))?;
    let month: u32 = m.parse().with_context(|| format!("invalid month in '{s}'"))?;
    if !(1..=12).contains(&month) {
        bail!("month must be 1-12, got {month}");
    }
    Ok((year, month))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_minutes("90m").unwrap(), 90);
        assert_eq!(parse_minutes("2h").unwrap(), 120);
        assert_eq!(parse_minutes("1h30m").unwrap(), 90);
        assert_eq!(parse_minutes("1d").unwrap(), 1440);
        assert_eq!(parse_minutes("1w").unwrap(), 10080);
        assert_eq!(parse_minutes("45").unwrap(), 45);
        assert!(parse_minutes("").is_err());
        assert!(parse_minutes("soon").is_err());
        assert!(parse_minutes("30m2h").is_err());
    }

    #[test]
    fn months_and_dates() {
        assert_eq!(parse_month("2026-03").unwrap(), (2026, 3));
        assert!(parse_month("2026-13").is_err());
        assert!(parse_month("march").is_err());
        assert!(parse_date("2026-02-30").is_err());
    }

    #[test]
    fn local_time_uses_zone() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        let t = parse_time("2026-01-15 09:00", tz).unwrap();
        assert_eq!(t.to_rfc3339(), "2026-01-15T08:00:00+00:00");
        assert_eq!(format_local(t, tz), "2026-01-15 09:00");
    }
}
