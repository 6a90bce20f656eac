//! Event calendar: an overlap-free interval set with recurrence expansion.
//!
//! Inserts are rejected when they overlap an existing event. Updates only
//! re-check overlaps in strict mode, so a calendar built through updates (or
//! restored from disk) may still contain overlapping events.

pub mod event;
pub mod recurrence;

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::time::{day_window, month_window, week_window};

pub use event::Event;
pub use recurrence::{
    MAX_OCCURRENCES, RecurrenceEnd, RecurrenceKind, RecurrenceRule, generate_recurring_events,
};

#[derive(Debug, Clone, Default)]
pub struct Calendar {
    events: BTreeMap<String, Event>,
    strict_update_conflicts: bool,
}

impl Calendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `update_event` reject overlaps the way `add_event` does.
    pub fn with_strict_update_conflicts(mut self, strict: bool) -> Self {
        self.strict_update_conflicts = strict;
        self
    }

    /// Rebuild from stored events. Each one is validated; overlaps are kept.
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> CoreResult<Self> {
        let mut calendar = Calendar::new();
        for event in events {
            calendar.insert_stored(event)?;
        }
        Ok(calendar)
    }

    /// Insert a previously stored event as-is: it must carry an unused id and
    /// be valid, but may overlap events already present.
    pub fn insert_stored(&mut self, event: Event) -> CoreResult<Event> {
        if event.id.is_empty() {
            return Err(CoreError::validation(format!(
                "stored event '{}' has no id",
                event.title
            )));
        }
        event.validate()?;
        if self.events.contains_key(&event.id) {
            return Err(CoreError::validation(format!("duplicate event id {}", event.id)));
        }
        self.events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn get_event(&self, id: &str) -> CoreResult<&Event> {
        self.events
            .get(id)
            .ok_or_else(|| CoreError::event_not_found(id))
    }

    /// Validate, reject overlaps, then insert. Assigns an id if missing.
    pub fn add_event(&mut self, mut event: Event, now: DateTime<Utc>) -> CoreResult<Event> {
        event.created_at = now;
        event.updated_at = now;
        self.insert_checked(event)
    }

    /// Like `add_event`, but keeps the event's own timestamps (imports).
    pub fn restore_event(&mut self, event: Event) -> CoreResult<Event> {
        self.insert_checked(event)
    }

    fn insert_checked(&mut self, mut event: Event) -> CoreResult<Event> {
        if event.id.is_empty() {
            event.id = Uuid::new_v4().to_string();
        } else if self.events.contains_key(&event.id) {
            return Err(CoreError::validation(format!("event id {} already exists", event.id)));
        }
        event.validate()?;
        self.reject_conflicts(&event)?;

        tracing::debug!(event_id = %event.id, start = %event.start, "event added");
        self.events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    /// Replace a stored event. `created_at` is preserved.
    pub fn update_event(&mut self, mut event: Event, now: DateTime<Utc>) -> CoreResult<Event> {
        let existing = self.get_event(&event.id)?;
        event.validate()?;
        if self.strict_update_conflicts {
            self.reject_conflicts(&event)?;
        }

        event.created_at = existing.created_at;
        event.updated_at = now;
        tracing::debug!(event_id = %event.id, "event updated");
        self.events.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    pub fn remove_event(&mut self, id: &str) -> CoreResult<Event> {
        let removed = self
            .events
            .remove(id)
            .ok_or_else(|| CoreError::event_not_found(id))?;
        tracing::debug!(event_id = %id, "event removed");
        Ok(removed)
    }

    /// Stored events (other than `event` itself) overlapping it, by start time.
    pub fn find_conflicts(&self, event: &Event) -> Vec<&Event> {
        let mut conflicts: Vec<&Event> = self
            .events
            .values()
            .filter(|other| other.id != event.id && event.overlaps(other))
            .collect();
        sort_by_start(&mut conflicts);
        conflicts
    }

    fn reject_conflicts(&self, event: &Event) -> CoreResult<()> {
        let conflicts = self.find_conflicts(event);
        if conflicts.is_empty() {
            return Ok(());
        }
        Err(CoreError::Conflict {
            event_id: event.id.clone(),
            conflicts: conflicts.into_iter().map(|e| e.id.clone()).collect(),
        })
    }

    /// Events overlapping the (inclusive) filter window, by start time.
    ///
    /// An event is dropped only when it ends before `start` or starts after
    /// `end`; either bound may be omitted.
    pub fn list_events(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Vec<&Event> {
        let mut out: Vec<&Event> = self
            .events
            .values()
            .filter(|e| start.is_none_or(|s| e.end >= s))
            .filter(|e| end.is_none_or(|en| e.start <= en))
            .collect();
        sort_by_start(&mut out);
        out
    }

    pub fn all_events(&self) -> Vec<&Event> {
        self.list_events(None, None)
    }

    /// Day, week and month views treat the window end as exclusive, so an
    /// event starting at the next midnight belongs to the next day.
    fn list_window(&self, (start, end): (DateTime<Utc>, DateTime<Utc>)) -> Vec<&Event> {
        self.list_events(Some(start), Some(end))
            .into_iter()
            .filter(|e| e.start < end)
            .collect()
    }

    pub fn events_for_day(&self, date: NaiveDate, tz: Tz) -> CoreResult<Vec<&Event>> {
        Ok(self.list_window(day_window(date, tz)?))
    }

    /// Monday through Sunday.
    pub fn events_for_week(&self, date: NaiveDate, tz: Tz) -> CoreResult<Vec<&Event>> {
        Ok(self.list_window(week_window(date, tz)?))
    }

    pub fn events_for_month(&self, year: i32, month: u32, tz: Tz) -> CoreResult<Vec<&Event>> {
        Ok(self.list_window(month_window(year, month, tz)?))
    }

    pub fn search_events(&self, text: &str) -> Vec<&Event> {
        let needle = text.to_lowercase();
        let mut out: Vec<&Event> = self
            .events
            .values()
            .filter(|e| e.matches_text(&needle))
            .collect();
        sort_by_start(&mut out);
        out
    }

    pub fn events_by_tag(&self, tag: &str) -> Vec<&Event> {
        let mut out: Vec<&Event> = self.events.values().filter(|e| e.has_tag(tag)).collect();
        sort_by_start(&mut out);
        out
    }

    /// Expand a stored event's recurrence over `[from, to)`.
    pub fn expand(&self, id: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> CoreResult<Vec<Event>> {
        generate_recurring_events(self.get_event(id)?, from, to)
    }
}

fn sort_by_start(events: &mut [&Event]) {
    events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
}

/// Cloneable handle for concurrent callers: mutations take the write lock,
/// queries the read lock. Each operation runs entirely under one lock.
#[derive(Debug, Clone, Default)]
pub struct SharedCalendar {
    inner: Arc<RwLock<Calendar>>,
}

impl SharedCalendar {
    pub fn new(calendar: Calendar) -> Self {
        Self {
            inner: Arc::new(RwLock::new(calendar)),
        }
    }

    /// Run `f` under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&Calendar) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&*guard)
    }

    /// Run `f` under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut Calendar) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *guard)
    }

    pub fn add_event(&self, event: Event, now: DateTime<Utc>) -> CoreResult<Event> {
        self.write(|c| c.add_event(event, now))
    }

    pub fn update_event(&self, event: Event, now: DateTime<Utc>) -> CoreResult<Event> {
        self.write(|c| c.update_event(event, now))
    }

    pub fn remove_event(&self, id: &str) -> CoreResult<Event> {
        self.write(|c| c.remove_event(id))
    }

    pub fn get_event(&self, id: &str) -> CoreResult<Event> {
        self.read(|c| c.get_event(id).cloned())
    }

    pub fn list_events(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Vec<Event> {
        self.read(|c| c.list_events(start, end).into_iter().cloned().collect())
    }

    pub fn search_events(&self, text: &str) -> Vec<Event> {
        self.read(|c| c.search_events(text).into_iter().cloned().collect())
    }

    /// Copy out the current state, e.g. for persisting.
    pub fn snapshot(&self) -> Calendar {
        self.read(Calendar::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::thread;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, d, h, m, 0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        at(1, 7, 0)
    }

    #[test]
    fn add_assigns_id_and_timestamps() {
        let mut cal = Calendar::new();
        let ev = cal
            .add_event(Event::new("dentist", at(2, 10, 0), at(2, 11, 0)), now())
            .unwrap();
        assert!(Uuid::parse_str(&ev.id).is_ok());
        assert_eq!(ev.created_at, now());
        assert_eq!(cal.get_event(&ev.id).unwrap(), &ev);
        assert_eq!(cal.event_count(), 1);
    }

    #[test]
    fn overlapping_insert_is_rejected() {
        let mut cal = Calendar::new();
        let first = cal
            .add_event(Event::new("a", at(2, 10, 0), at(2, 11, 0)), now())
            .unwrap();
        cal.add_event(Event::new("back to back", at(2, 11, 0), at(2, 12, 0)), now())
            .unwrap();

        let err = cal
            .add_event(Event::new("c", at(2, 10, 30), at(2, 11, 30)).with_id("c"), now())
            .unwrap_err();
        match err {
            CoreError::Conflict { event_id, conflicts } => {
                assert_eq!(event_id, "c");
                assert_eq!(conflicts.len(), 2);
                assert_eq!(conflicts[0], first.id);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(cal.event_count(), 2);
        assert!(cal.get_event("c").is_err());
    }

    #[test]
    fn invalid_events_are_not_inserted() {
        let mut cal = Calendar::new();
        assert_eq!(
            cal.add_event(Event::new("", at(2, 10, 0), at(2, 11, 0)), now())
                .unwrap_err()
                .kind(),
            "validation"
        );
        let bad_rule = RecurrenceRule::daily().with_interval(0);
        assert!(
            cal.add_event(
                Event::new("x", at(2, 10, 0), at(2, 11, 0)).with_recurrence(bad_rule),
                now()
            )
            .is_err()
        );
        assert_eq!(cal.event_count(), 0);
    }

    #[test]
    fn restore_keeps_timestamps_but_still_checks_overlap() {
        let mut cal = Calendar::new();
        let mut ev = Event::new("imported", at(2, 10, 0), at(2, 11, 0)).with_id("imp");
        ev.created_at = at(1, 0, 0);
        ev.updated_at = at(1, 1, 0);
        let restored = cal.restore_event(ev.clone()).unwrap();
        assert_eq!(restored, ev);

        let clash = Event::new("clash", at(2, 10, 0), at(2, 10, 30)).with_id("clash");
        assert_eq!(cal.restore_event(clash).unwrap_err().kind(), "conflict");
        assert_eq!(cal.restore_event(ev).unwrap_err().kind(), "validation");
    }

    #[test]
    fn update_skips_conflicts_unless_strict() {
        let mut cal = Calendar::new();
        cal.add_event(Event::new("a", at(2, 10, 0), at(2, 11, 0)), now())
            .unwrap();
        let b = cal
            .add_event(Event::new("b", at(2, 12, 0), at(2, 13, 0)), now())
            .unwrap();

        let mut moved = b.clone();
        moved.start = at(2, 10, 30);
        moved.end = at(2, 11, 30);
        let later = now() + Duration::hours(1);

        let mut strict = cal.clone().with_strict_update_conflicts(true);
        assert_eq!(strict.update_event(moved.clone(), later).unwrap_err().kind(), "conflict");

        let updated = cal.update_event(moved, later).unwrap();
        assert_eq!(updated.created_at, now());
        assert_eq!(updated.updated_at, later);
        assert_eq!(cal.get_event(&b.id).unwrap().start, at(2, 10, 30));
    }

    #[test]
    fn update_and_remove_unknown_ids() {
        let mut cal = Calendar::new();
        let ghost = Event::new("ghost", at(2, 10, 0), at(2, 11, 0)).with_id("nope");
        assert_eq!(
            cal.update_event(ghost, now()).unwrap_err(),
            CoreError::event_not_found("nope")
        );
        assert_eq!(cal.remove_event("nope").unwrap_err().kind(), "not_found");
    }

    #[test]
    fn list_events_returns_overlapping_window() {
        let mut cal = Calendar::new();
        let early = cal
            .add_event(Event::new("early", at(2, 8, 0), at(2, 9, 30)), now())
            .unwrap();
        let inside = cal
            .add_event(Event::new("inside", at(2, 10, 0), at(2, 11, 0)), now())
            .unwrap();
        cal.add_event(Event::new("late", at(3, 10, 0), at(3, 11, 0)), now())
            .unwrap();

        let ids: Vec<&str> = cal
            .list_events(Some(at(2, 9, 0)), Some(at(2, 12, 0)))
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec![early.id.as_str(), inside.id.as_str()]);
        assert_eq!(cal.list_events(None, None).len(), 3);
        assert_eq!(cal.list_events(Some(at(3, 0, 0)), None).len(), 1);
    }

    #[test]
    fn list_filter_bounds_are_inclusive_but_day_end_is_not() {
        let mut cal = Calendar::new();
        let ends_at_from = cal
            .add_event(Event::new("ends at from", at(2, 8, 0), at(2, 9, 0)), now())
            .unwrap();
        let starts_at_to = cal
            .add_event(Event::new("starts at to", at(2, 12, 0), at(2, 13, 0)), now())
            .unwrap();
        let midnight = cal
            .add_event(Event::new("midnight", at(3, 0, 0), at(3, 1, 0)), now())
            .unwrap();

        let ids: Vec<&str> = cal
            .list_events(Some(at(2, 9, 0)), Some(at(2, 12, 0)))
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec![ends_at_from.id.as_str(), starts_at_to.id.as_str()]);

        let whole_day = cal.list_events(Some(at(2, 0, 0)), Some(at(3, 0, 0)));
        assert!(whole_day.iter().any(|e| e.id == midnight.id));

        let day = NaiveDate::from_ymd_opt(2026, 6, 2).unwrap();
        let ids: Vec<&str> = cal
            .events_for_day(day, Tz::UTC)
            .unwrap()
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec![ends_at_from.id.as_str(), starts_at_to.id.as_str()]);
    }

    #[test]
    fn day_week_month_views() {
        let mut cal = Calendar::new();
        // 2026-06-01 is a Monday.
        cal.add_event(Event::new("mon", at(1, 9, 0), at(1, 10, 0)), now())
            .unwrap();
        cal.add_event(Event::new("sun", at(7, 9, 0), at(7, 10, 0)), now())
            .unwrap();
        cal.add_event(Event::new("next mon", at(8, 0, 0), at(8, 1, 0)), now())
            .unwrap();

        let monday = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2026, 6, 7).unwrap();
        assert_eq!(cal.events_for_day(monday, Tz::UTC).unwrap().len(), 1);
        assert_eq!(cal.events_for_day(sunday, Tz::UTC).unwrap().len(), 1);

        let week: Vec<&str> = cal
            .events_for_week(sunday, Tz::UTC)
            .unwrap()
            .iter()
            .map(|e| e.title.as_str())
            .collect();
        assert_eq!(week, vec!["mon", "sun"]);

        assert_eq!(cal.events_for_month(2026, 6, Tz::UTC).unwrap().len(), 3);
        assert!(cal.events_for_month(2026, 7, Tz::UTC).unwrap().is_empty());
    }

    #[test]
    fn search_and_tags() {
        let mut cal = Calendar::new();
        cal.add_event(
            Event::new("Team sync", at(2, 10, 0), at(2, 11, 0)).with_tag("work"),
            now(),
        )
        .unwrap();
        cal.add_event(
            Event::new("Concert", at(1, 20, 0), at(1, 22, 0)).with_location("Team Arena"),
            now(),
        )
        .unwrap();
        cal.add_event(Event::new("Gym", at(3, 7, 0), at(3, 8, 0)), now())
            .unwrap();

        let titles: Vec<&str> = cal.search_events("TEAM").iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Concert", "Team sync"]);
        assert_eq!(cal.events_by_tag("WORK").len(), 1);
        assert!(cal.search_events("yoga").is_empty());
    }

    #[test]
    fn expand_stored_series() {
        let mut cal = Calendar::new();
        let ev = cal
            .add_event(
                Event::new("standup", at(1, 9, 0), at(1, 9, 15))
                    .with_recurrence(RecurrenceRule::daily().with_count(5)),
                now(),
            )
            .unwrap();
        let out = cal.expand(&ev.id, at(1, 0, 0), at(30, 0, 0)).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[4].id, format!("{}-4", ev.id));
        assert!(cal.expand("missing", at(1, 0, 0), at(2, 0, 0)).is_err());
    }

    #[test]
    fn from_events_validates_but_keeps_overlaps() {
        let a = Event::new("a", at(2, 10, 0), at(2, 11, 0)).with_id("a");
        let b = Event::new("b", at(2, 10, 30), at(2, 11, 30)).with_id("b");
        let cal = Calendar::from_events(vec![a.clone(), b]).unwrap();
        assert_eq!(cal.event_count(), 2);

        assert!(Calendar::from_events(vec![a.clone(), a.clone()]).is_err());
        let mut no_id = a;
        no_id.id.clear();
        assert!(Calendar::from_events(vec![no_id]).is_err());
    }

    #[test]
    fn shared_calendar_serializes_writers() {
        let shared = SharedCalendar::default();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let shared = shared.clone();
                thread::spawn(move || {
                    // Every thread tries the same slot; only one may win.
                    let ev = Event::new(format!("t{i}"), at(5, 10, 0), at(5, 11, 0));
                    shared.add_event(ev, now()).is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(shared.list_events(None, None).len(), 1);
        assert_eq!(shared.snapshot().event_count(), 1);
    }
}
