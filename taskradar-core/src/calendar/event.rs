use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::recurrence::RecurrenceRule;
use crate::error::{CoreError, CoreResult};

/// A scheduled block of time, optionally repeating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Empty until the calendar assigns one.
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,

    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    // Stamped by the calendar on insert/update.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn new(title: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            description: String::new(),
            location: String::new(),
            start,
            end,
            all_day: false,
            recurrence: None,
            tags: Vec::new(),
            created_at: start,
            updated_at: start,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_all_day(mut self, all_day: bool) -> Self {
        self.all_day = all_day;
        self
    }

    pub fn with_recurrence(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence = Some(rule);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Half-open overlap: back-to-back events do not collide.
    pub fn overlaps(&self, other: &Event) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// ASCII case-insensitive, so "Work" and "work" are the same tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// `needle` must already be lowercase.
    pub(crate) fn matches_text(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.location.to_lowercase().contains(needle)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.title.trim().is_empty() {
            return Err(CoreError::validation("event title is required"));
        }
        if self.end < self.start {
            return Err(CoreError::validation("end time must be after start time"));
        }
        if let Some(rule) = &self.recurrence {
            rule.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, h, m, 0).unwrap()
    }

    #[test]
    fn touching_events_do_not_overlap() {
        let a = Event::new("a", at(10, 0), at(11, 0));
        let b = Event::new("b", at(11, 0), at(12, 0));
        let c = Event::new("c", at(10, 30), at(11, 30));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn validation() {
        assert!(Event::new(" ", at(10, 0), at(11, 0)).validate().is_err());
        assert!(Event::new("x", at(11, 0), at(10, 0)).validate().is_err());
        assert!(Event::new("all day marker", at(0, 0), at(0, 0)).validate().is_ok());
    }

    #[test]
    fn json_shape_omits_empty_fields() {
        use crate::calendar::recurrence::RecurrenceRule;

        let plain = Event::new("x", at(10, 0), at(11, 0)).with_id("e1");
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("recurrence").is_none());
        assert!(json.get("tags").is_none());
        assert_eq!(json["start"], "2026-06-01T10:00:00Z");

        let weekly = plain.with_recurrence(RecurrenceRule::weekly().with_count(3));
        let json = serde_json::to_value(&weekly).unwrap();
        assert_eq!(json["recurrence"]["kind"], "weekly");
        assert_eq!(json["recurrence"]["end"]["count"], 3);
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, weekly);
    }

    #[test]
    fn tags_are_unique_and_case_insensitive() {
        let ev = Event::new("x", at(10, 0), at(11, 0))
            .with_tag("Work")
            .with_tag("Work");
        assert_eq!(ev.tags, vec!["Work".to_string()]);
        assert!(ev.has_tag("work"));
    }
}
