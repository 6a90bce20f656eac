use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc, Weekday};
use chrono_tz::Tz;
use clap::Subcommand;
use std::fs;
use std::path::{Path, PathBuf};

use taskradar_core::{Event, RecurrenceEnd, RecurrenceKind, RecurrenceRule};

use crate::parse::{format_local, parse_date, parse_minutes, parse_month, parse_time};
use crate::state::Session;

#[derive(Subcommand, Debug)]
pub enum CalendarCommand {
    /// Add an event; overlapping events are rejected
    Add {
        title: String,

        /// Local start, "YYYY-MM-DD HH:MM"
        #[arg(long)]
        start: String,

        /// Local end; alternatively give --duration
        #[arg(long, conflicts_with = "duration")]
        end: Option<String>,

        /// e.g. 45m, 1h30m (default: 1h)
        #[arg(long)]
        duration: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        all_day: bool,

        /// daily | weekly | monthly | yearly
        #[arg(long)]
        recurring: Option<String>,

        #[arg(long, default_value_t = 1)]
        interval: u32,

        /// Stop after N occurrences
        #[arg(long, conflicts_with = "until")]
        count: Option<u32>,

        /// Last possible start, "YYYY-MM-DD [HH:MM]"
        #[arg(long)]
        until: Option<String>,

        /// Day of month for monthly series (0 = same as start)
        #[arg(long, default_value_t = 0)]
        month_day: u8,
    },

    /// Change an event's title, time or place
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        #[arg(long)]
        location: Option<String>,
    },

    /// List events (default: everything from now on)
    List {
        /// YYYY-MM-DD
        #[arg(long, conflicts_with_all = ["week", "month"])]
        day: Option<String>,

        /// Any date in the week (weeks start Monday)
        #[arg(long, conflicts_with = "month")]
        week: Option<String>,

        /// YYYY-MM
        #[arg(long)]
        month: Option<String>,

        #[arg(long)]
        tag: Option<String>,
    },

    /// Case-insensitive search over title, description and location
    Search { text: String },

    /// Show conflicts an event has with the rest of the calendar
    Conflicts { id: String },

    Remove { id: String },

    /// List the concrete occurrences of a recurring event
    Expand {
        id: String,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },

    /// Print the calendar as ICS, or write it with --output
    ExportIcs {
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Write a JSON export of the calendar
    Export { path: PathBuf },

    /// Merge events from a JSON export; conflicting ones are skipped
    Import { path: PathBuf },
}

pub fn run(cmd: CalendarCommand, session: &mut Session) -> Result<()> {
    let tz = session.tz;
    let now = session.now;

    match cmd {
        CalendarCommand::Add {
            title,
            start,
            end,
            duration,
            description,
            location,
            tags,
            all_day,
            recurring,
            interval,
            count,
            until,
            month_day,
        } => {
            let start = parse_time(&start, tz)?;
            let end = match (end, duration) {
                (Some(end), _) => parse_time(&end, tz)?,
                (None, Some(d)) => start + Duration::minutes(parse_minutes(&d)?.into()),
                (None, None) => start + Duration::hours(1),
            };

            let mut event = Event::new(title, start, end).with_all_day(all_day);
            if let Some(d) = description {
                event = event.with_description(d);
            }
            if let Some(l) = location {
                event = event.with_location(l);
            }
            for tag in tags {
                event = event.with_tag(tag);
            }
            if let Some(kind) = recurring {
                let mut rule = RecurrenceRule::new(kind.parse()?)
                    .with_interval(interval)
                    .with_month_day(month_day);
                if let Some(n) = count {
                    rule = rule.with_count(n);
                }
                if let Some(u) = until {
                    rule = rule.with_until(parse_time(&u, tz)?);
                }
                event = event.with_recurrence(rule);
            }

            let event = session.workspace.calendar.add_event(event, now)?;
            session.save()?;
            println!("Added event {}", event.id);
            print_event(&event, tz);
        }

        CalendarCommand::Edit {
            id,
            title,
            start,
            end,
            location,
        } => {
            let mut event = session.workspace.calendar.get_event(&id)?.clone();
            if let Some(t) = title {
                event.title = t;
            }
            if let Some(s) = start {
                // Moving the start keeps the duration unless --end is given too.
                let new_start = parse_time(&s, tz)?;
                event.end = new_start + event.duration();
                event.start = new_start;
            }
            if let Some(e) = end {
                event.end = parse_time(&e, tz)?;
            }
            if let Some(l) = location {
                event.location = l;
            }

            let event = session.workspace.calendar.update_event(event, now)?;
            let overlaps = session.workspace.calendar.find_conflicts(&event).len();
            session.save()?;
            println!("Updated event {}", event.id);
            if overlaps > 0 {
                println!("warning: overlaps {overlaps} other event(s)");
            }
        }

        CalendarCommand::List {
            day,
            week,
            month,
            tag,
        } => {
            let cal = &session.workspace.calendar;
            let mut events = if let Some(d) = day {
                cal.events_for_day(parse_date(&d)?, tz)?
            } else if let Some(w) = week {
                cal.events_for_week(parse_date(&w)?, tz)?
            } else if let Some(m) = month {
                let (year, month) = parse_month(&m)?;
                cal.events_for_month(year, month, tz)?
            } else if let Some(t) = &tag {
                cal.events_by_tag(t)
            } else {
                cal.list_events(Some(now), None)
            };
            if let Some(tag) = tag {
                events.retain(|e| e.has_tag(&tag));
            }

            if events.is_empty() {
                println!("No events.");
            }
            for e in events {
                print_event(e, tz);
            }
        }

        CalendarCommand::Search { text } => {
            for e in session.workspace.calendar.search_events(&text) {
                print_event(e, tz);
            }
        }

        CalendarCommand::Conflicts { id } => {
            let cal = &session.workspace.calendar;
            let event = cal.get_event(&id)?;
            let conflicts = cal.find_conflicts(event);
            if conflicts.is_empty() {
                println!("No conflicts.");
            }
            for e in conflicts {
                print_event(e, tz);
            }
        }

        CalendarCommand::Remove { id } => {
            let removed = session.workspace.calendar.remove_event(&id)?;
            session.save()?;
            println!("Removed {} ({})", removed.id, removed.title);
        }

        CalendarCommand::Expand { id, from, to } => {
            let from = parse_time(&from, tz)?;
            let to = parse_time(&to, tz)?;
            if to <= from {
                bail!("--to must be after --from");
            }
            for occ in session.workspace.calendar.expand(&id, from, to)? {
                print_event(&occ, tz);
            }
        }

        CalendarCommand::ExportIcs { output } => {
            let events = session.workspace.calendar.all_events();
            match output {
                Some(path) => {
                    write_ics(&path, &events)?;
                    println!("Wrote {} events to {}", events.len(), path.display());
                }
                None => print!("{}", events_to_ics(&events)),
            }
        }

        CalendarCommand::Export { path } => {
            let n = session
                .file
                .export_calendar(&session.workspace.calendar, &path, now)
                .with_context(|| format!("export to {}", path.display()))?;
            println!("Exported {n} events to {}", path.display());
        }

        CalendarCommand::Import { path } => {
            let summary = session
                .file
                .import_calendar(&mut session.workspace.calendar, &path)
                .with_context(|| format!("import from {}", path.display()))?;
            session.save()?;
            println!(
                "Imported {} events ({} skipped)",
                summary.imported, summary.skipped
            );
        }
    }

    Ok(())
}

fn print_event(e: &Event, tz: Tz) {
    let repeat = match &e.recurrence {
        Some(rule) if rule.is_recurring() => format!(" [{:?} x{}]", rule.kind, rule.interval),
        _ => String::new(),
    };
    let place = if e.location.is_empty() {
        String::new()
    } else {
        format!(" @ {}", e.location)
    };
    println!(
        "{}  {} -> {}  {}{}{}",
        e.id,
        format_local(e.start, tz),
        format_local(e.end, tz),
        e.title,
        place,
        repeat
    );
}

/// Emit an ICS calendar with one VEVENT per stored event.
///
/// Times are UTC; recurring events carry an RRULE.
pub fn events_to_ics(events: &[&Event]) -> String {
    let mut s = String::new();
    s.push_str("BEGIN:VCALENDAR\nVERSION:2.0\nPRODID:-//TaskRadar//EN\n");

    for e in events {
        s.push_str("BEGIN:VEVENT\n");
        s.push_str(&format!("UID:{}@taskradar\n", e.id));
        s.push_str(&format!("DTSTAMP:{}\n", ics_time(e.updated_at)));
        if e.all_day {
            s.push_str(&format!("DTSTART;VALUE=DATE:{}\n", e.start.format("%Y%m%d")));
            s.push_str(&format!("DTEND;VALUE=DATE:{}\n", e.end.format("%Y%m%d")));
        } else {
            s.push_str(&format!("DTSTART:{}\n", ics_time(e.start)));
            s.push_str(&format!("DTEND:{}\n", ics_time(e.end)));
        }
        s.push_str(&format!("SUMMARY:{}\n", escape_ics(&e.title)));
        if !e.description.is_empty() {
            s.push_str(&format!("DESCRIPTION:{}\n", escape_ics(&e.description)));
        }
        if !e.location.is_empty() {
            s.push_str(&format!("LOCATION:{}\n", escape_ics(&e.location)));
        }
        if !e.tags.is_empty() {
            let tags: Vec<String> = e.tags.iter().map(|t| escape_ics(t)).collect();
            s.push_str(&format!("CATEGORIES:{}\n", tags.join(",")));
        }
        if let Some(rrule) = e.recurrence.as_ref().and_then(rrule) {
            s.push_str(&format!("RRULE:{rrule}\n"));
        }
        s.push_str("END:VEVENT\n");
    }

    s.push_str("END:VCALENDAR\n");
    s
}

fn ics_time(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

fn rrule(rule: &RecurrenceRule) -> Option<String> {
    let mut parts = Vec::new();
    match rule.kind {
        RecurrenceKind::None => return None,
        RecurrenceKind::Daily => parts.push("FREQ=DAILY".to_string()),
        RecurrenceKind::Weekly => parts.push("FREQ=WEEKLY".to_string()),
        RecurrenceKind::Monthly => parts.push("FREQ=MONTHLY".to_string()),
        RecurrenceKind::Yearly => parts.push("FREQ=YEARLY".to_string()),
        RecurrenceKind::Custom if !rule.weekdays.is_empty() => {
            parts.push("FREQ=WEEKLY".to_string());
            let days: Vec<&str> = rule.weekdays.iter().map(|d| ics_weekday(*d)).collect();
            parts.push(format!("BYDAY={}", days.join(",")));
        }
        RecurrenceKind::Custom => parts.push("FREQ=MONTHLY".to_string()),
    }
    parts.push(format!("INTERVAL={}", rule.interval));
    if rule.month_day > 0 && rule.kind != RecurrenceKind::Yearly {
        parts.push(format!("BYMONTHDAY={}", rule.month_day));
    }
    match rule.end {
        Some(RecurrenceEnd::Count(n)) => parts.push(format!("COUNT={n}")),
        Some(RecurrenceEnd::Until(u)) => parts.push(format!("UNTIL={}", ics_time(u))),
        None => {}
    }
    Some(parts.join(";"))
}

fn ics_weekday(d: Weekday) -> &'static str {
    match d {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn escape_ics(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(',', "\\,")
        .replace(';', "\\;")
}

pub fn write_ics(path: &Path, events: &[&Event]) -> Result<()> {
    fs::write(path, events_to_ics(events)).with_context(|| format!("write {}", path.display()))
}
