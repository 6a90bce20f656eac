//! Recurrence rules and their expansion into concrete occurrences.
//!
//! Occurrence `n` is computed from the base start (`start + n * interval`
//! units) rather than by repeatedly advancing a cursor, so month-end clamping
//! never drifts: Jan 31 + 1 month is Feb 28, + 2 months is Mar 31.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::calendar::event::Event;
use crate::error::{CoreError, CoreResult};

/// Expansion refuses to walk more than this many occurrences.
pub const MAX_OCCURRENCES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceKind {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Custom,
}

impl std::str::FromStr for RecurrenceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(RecurrenceKind::None),
            "daily" => Ok(RecurrenceKind::Daily),
            "weekly" => Ok(RecurrenceKind::Weekly),
            "monthly" => Ok(RecurrenceKind::Monthly),
            "yearly" => Ok(RecurrenceKind::Yearly),
            "custom" => Ok(RecurrenceKind::Custom),
            other => Err(CoreError::validation(format!("unknown recurrence type '{other}'"))),
        }
    }
}

/// When a series stops. A rule has at most one terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceEnd {
    /// No occurrence starts after this instant.
    Until(DateTime<Utc>),
    /// Total number of occurrences, the base one included.
    Count(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub kind: RecurrenceKind,

    /// Every N units.
    pub interval: u32,

    #[serde(default)]
    pub end: Option<RecurrenceEnd>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weekdays: Vec<Weekday>,

    /// 0 means "same day as the start".
    #[serde(default)]
    pub month_day: u8,
}

impl RecurrenceRule {
    pub fn new(kind: RecurrenceKind) -> Self {
        Self {
            kind,
            interval: 1,
            end: None,
            weekdays: Vec::new(),
            month_day: 0,
        }
    }

    pub fn daily() -> Self {
        Self::new(RecurrenceKind::Daily)
    }

    pub fn weekly() -> Self {
        Self::new(RecurrenceKind::Weekly)
    }

    pub fn monthly() -> Self {
        Self::new(RecurrenceKind::Monthly)
    }

    pub fn yearly() -> Self {
        Self::new(RecurrenceKind::Yearly)
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.end = Some(RecurrenceEnd::Count(count));
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.end = Some(RecurrenceEnd::Until(until));
        self
    }

    pub fn with_weekdays(mut self, weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        self.weekdays = weekdays.into_iter().collect();
        self
    }

    pub fn with_month_day(mut self, day: u8) -> Self {
        self.month_day = day;
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.kind != RecurrenceKind::None
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !self.is_recurring() {
            return Ok(());
        }
        if self.interval == 0 {
            return Err(CoreError::validation("recurrence interval must be positive"));
        }
        if self.end == Some(RecurrenceEnd::Count(0)) {
            return Err(CoreError::validation("recurrence count must be positive"));
        }
        if self.month_day > 31 {
            return Err(CoreError::validation(format!(
                "month day must be between 0 and 31, got {}",
                self.month_day
            )));
        }
        if self.kind == RecurrenceKind::Custom && self.weekdays.is_empty() && self.month_day == 0 {
            return Err(CoreError::validation(
                "custom recurrence needs weekdays or a month day",
            ));
        }
        Ok(())
    }

    /// Start of occurrence `n` (0 is the base event). `None` once out of range.
    fn nth_start(&self, base: DateTime<Utc>, n: u32) -> Option<DateTime<Utc>> {
        let steps = n.checked_mul(self.interval)?;
        match self.kind {
            RecurrenceKind::Daily => base.checked_add_signed(Duration::days(i64::from(steps))),
            RecurrenceKind::Weekly => base.checked_add_signed(Duration::weeks(i64::from(steps))),
            RecurrenceKind::Monthly => shift_months(base, steps, self.month_day),
            RecurrenceKind::Yearly => shift_months(base, steps.checked_mul(12)?, 0),
            RecurrenceKind::None | RecurrenceKind::Custom => None,
        }
    }
}

/// Move `base` forward by whole months, keeping the time of day. The day is
/// `month_day` (or the base day when 0), clamped to the target month's length.
fn shift_months(base: DateTime<Utc>, months: u32, month_day: u8) -> Option<DateTime<Utc>> {
    let date = base.date_naive();
    let first = date.with_day(1)?.checked_add_months(Months::new(months))?;
    let wanted = if month_day == 0 {
        date.day()
    } else {
        u32::from(month_day)
    };
    let day = wanted.min(days_in_month(first.year(), first.month()));
    let target = first.with_day(day)?;
    Some(target.and_time(base.time()).and_utc())
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(31, |d| d.day())
}

/// Expand `event` into the occurrences whose start lies in
/// `[window_start, window_end)`.
///
/// Non-recurring events come back as-is. Custom rules cannot be expanded.
/// Walking past [`MAX_OCCURRENCES`] without hitting a terminator or the
/// window end is an error.
pub fn generate_recurring_events(
    event: &Event,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> CoreResult<Vec<Event>> {
    let Some(rule) = event.recurrence.as_ref().filter(|r| r.is_recurring()) else {
        return Ok(vec![event.clone()]);
    };
    if rule.kind == RecurrenceKind::Custom {
        return Err(CoreError::UnsupportedRecurrence(rule.kind));
    }
    rule.validate()?;

    let duration = event.duration();
    let mut occurrences = Vec::new();
    // `step` walks the rule; `n` numbers the occurrences actually in the series.
    let mut step: u32 = 0;
    let mut n: u32 = 0;

    loop {
        let Some(start) = rule.nth_start(event.start, step) else {
            break;
        };
        if start > window_end {
            break;
        }
        step += 1;
        // A pinned month day can fall before the series start in the first month.
        if start < event.start {
            continue;
        }
        match rule.end {
            Some(RecurrenceEnd::Until(until)) if start > until => break,
            Some(RecurrenceEnd::Count(count)) if n >= count => break,
            _ => {}
        }
        if n as usize >= MAX_OCCURRENCES {
            return Err(CoreError::RecurrenceLimit(MAX_OCCURRENCES));
        }

        if start >= window_start && start < window_end {
            occurrences.push(Event {
                id: format!("{}-{}", event.id, n),
                start,
                end: start + duration,
                ..event.clone()
            });
        }
        n += 1;
    }

    tracing::debug!(
        event_id = %event.id,
        walked = step,
        produced = occurrences.len(),
        "recurrence expanded"
    );
    Ok(occurrences)
}
