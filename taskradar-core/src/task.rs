//! Task model: the records owned by the task graph.
//!
//! Scoring attributes (duration, energy, difficulty, priority) feed the cost
//! model; `money_cost` is always recomputed from them on every mutating path.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::compute_cost;
use crate::error::{CoreError, CoreResult};
use crate::radar::{RadarPoint, compute_radar_position};

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    /// Manually flagged. Independent of the derived prerequisite check.
    Blocked,
}

impl TaskStatus {
    /// Pending and in-progress work is what the daily budget is spent on.
    pub fn counts_against_budget(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" | "inprogress" | "active" => Ok(TaskStatus::InProgress),
            "done" | "completed" => Ok(TaskStatus::Done),
            "blocked" => Ok(TaskStatus::Blocked),
            other => Err(CoreError::validation(format!("unknown task status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
}

impl Priority {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(n: u8) -> Option<Self> {
        match n {
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            3 => Some(Priority::High),
            _ => None,
        }
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" | "1" => Ok(Priority::Low),
            "medium" | "2" => Ok(Priority::Medium),
            "high" | "3" => Ok(Priority::High),
            other => Err(CoreError::validation(format!("unknown priority '{other}'"))),
        }
    }
}

/// 1-3 energy a task demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLevel {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
}

impl EnergyLevel {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(n: u8) -> Option<Self> {
        match n {
            1 => Some(EnergyLevel::Low),
            2 => Some(EnergyLevel::Medium),
            3 => Some(EnergyLevel::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy = 1,
    #[default]
    Medium = 2,
    Hard = 3,
}

impl Difficulty {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(n: u8) -> Option<Self> {
        match n {
            1 => Some(Difficulty::Easy),
            2 => Some(Difficulty::Medium),
            3 => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Task,
    Appointment,
    Event,
    Concert,
    Meeting,
}

impl FromStr for TaskKind {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "task" => Ok(TaskKind::Task),
            "appointment" => Ok(TaskKind::Appointment),
            "event" => Ok(TaskKind::Event),
            "concert" => Ok(TaskKind::Concert),
            "meeting" => Ok(TaskKind::Meeting),
            other => Err(CoreError::validation(format!("unknown task kind '{other}'"))),
        }
    }
}

/// Coarse deadline proximity, used to colour task lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyBand {
    Overdue,
    /// Due within 24 hours.
    Urgent,
    /// Due within 3 days.
    Soon,
    Normal,
    HighPriority,
    MediumPriority,
    LowPriority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: TaskKind,

    /// Tree edge. Children form a forest.
    pub parent_id: Option<TaskId>,

    /// Minutes.
    pub estimated_duration: i32,

    pub deadline: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    /// Only meaningful for event-like kinds.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    pub priority: Priority,
    pub status: TaskStatus,
    pub energy: EnergyLevel,
    pub difficulty: Difficulty,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Derived from the scoring attributes.
    pub money_cost: i64,

    pub location: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_event(&self) -> bool {
        self.kind != TaskKind::Task
    }

    pub fn cost(&self) -> i64 {
        compute_cost(
            self.estimated_duration,
            self.energy.ordinal(),
            self.difficulty.ordinal(),
            self.priority.ordinal(),
        )
    }

    pub fn recompute_cost(&mut self) {
        self.money_cost = self.cost();
    }

    pub fn radar_position(&self, now: DateTime<Utc>) -> RadarPoint {
        compute_radar_position(self, now)
    }

    /// Event span when both ends are known, else the estimate.
    pub fn scheduled_duration(&self) -> Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end - start,
            _ => Duration::minutes(self.estimated_duration.into()),
        }
    }

    pub fn urgency_band(&self, now: DateTime<Utc>) -> UrgencyBand {
        let Some(deadline) = self.deadline else {
            return match self.priority {
                Priority::High => UrgencyBand::HighPriority,
                Priority::Medium => UrgencyBand::MediumPriority,
                Priority::Low => UrgencyBand::LowPriority,
            };
        };

        let left = deadline - now;
        if left < Duration::zero() {
            UrgencyBand::Overdue
        } else if left < Duration::hours(24) {
            UrgencyBand::Urgent
        } else if left < Duration::hours(72) {
            UrgencyBand::Soon
        } else {
            UrgencyBand::Normal
        }
    }
}

/// Attributes accepted by `TaskGraph::create_task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub kind: TaskKind,
    pub parent_id: Option<TaskId>,
    pub estimated_duration: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub energy: EnergyLevel,
    pub difficulty: Difficulty,
    pub tags: BTreeSet<String>,
    pub location: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            kind: TaskKind::Task,
            parent_id: None,
            estimated_duration: 30,
            deadline: None,
            start_time: None,
            end_time: None,
            priority: Priority::Medium,
            energy: EnergyLevel::Medium,
            difficulty: Difficulty::Medium,
            tags: BTreeSet::new(),
            location: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn with_duration(mut self, minutes: i32) -> Self {
        self.estimated_duration = minutes;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_energy(mut self, energy: EnergyLevel) -> Self {
        self.energy = energy;
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub(crate) fn validate(&self) -> CoreResult<()> {
        validate_title(&self.title)?;
        validate_duration(self.estimated_duration)?;
        validate_span(self.start_time, self.end_time)
    }
}

/// Typed partial update. `None` leaves a field untouched; the nested options
/// (`parent_id`, `deadline`, ...) use `Some(None)` to clear.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: Option<TaskKind>,
    pub parent_id: Option<Option<TaskId>>,
    pub estimated_duration: Option<i32>,
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub start_time: Option<Option<DateTime<Utc>>>,
    pub end_time: Option<Option<DateTime<Utc>>>,
    pub priority: Option<Priority>,
    pub energy: Option<EnergyLevel>,
    pub difficulty: Option<Difficulty>,
    pub tags: Option<BTreeSet<String>>,
    pub location: Option<Option<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }

    /// True when the patch changes an input of the cost model.
    pub fn touches_cost(&self) -> bool {
        self.estimated_duration.is_some()
            || self.energy.is_some()
            || self.difficulty.is_some()
            || self.priority.is_some()
    }

    pub(crate) fn validate(&self) -> CoreResult<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(minutes) = self.estimated_duration {
            validate_duration(minutes)?;
        }
        Ok(())
    }

    /// Apply every present field. Cost and timestamps are the caller's job.
    pub(crate) fn apply(self, task: &mut Task) {
        if let Some(v) = self.title {
            task.title = v;
        }
        if let Some(v) = self.description {
            task.description = v;
        }
        if let Some(v) = self.kind {
            task.kind = v;
        }
        if let Some(v) = self.parent_id {
            task.parent_id = v;
        }
        if let Some(v) = self.estimated_duration {
            task.estimated_duration = v;
        }
        if let Some(v) = self.deadline {
            task.deadline = v;
        }
        if let Some(v) = self.start_time {
            task.start_time = v;
        }
        if let Some(v) = self.end_time {
            task.end_time = v;
        }
        if let Some(v) = self.priority {
            task.priority = v;
        }
        if let Some(v) = self.energy {
            task.energy = v;
        }
        if let Some(v) = self.difficulty {
            task.difficulty = v;
        }
        if let Some(v) = self.tags {
            task.tags = v;
        }
        if let Some(v) = self.location {
            task.location = v;
        }
    }
}

fn validate_title(title: &str) -> CoreResult<()> {
    if title.trim().is_empty() {
        return Err(CoreError::validation("task title must be non-empty"));
    }
    Ok(())
}

fn validate_duration(minutes: i32) -> CoreResult<()> {
    if minutes < 0 {
        return Err(CoreError::validation(format!(
            "estimated duration must be >= 0 minutes, got {minutes}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_span(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> CoreResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(CoreError::validation("end time must not be before start time"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(now: DateTime<Utc>) -> Task {
        let new = NewTask::new("write report").with_duration(60);
        Task {
            id: 1,
            title: new.title,
            description: new.description,
            kind: new.kind,
            parent_id: None,
            estimated_duration: new.estimated_duration,
            deadline: None,
            start_time: None,
            end_time: None,
            priority: new.priority,
            status: TaskStatus::Pending,
            energy: new.energy,
            difficulty: new.difficulty,
            tags: new.tags,
            money_cost: 0,
            location: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn ordinals_match_levels() {
        assert_eq!(Priority::High.ordinal(), 3);
        assert_eq!(EnergyLevel::Low.ordinal(), 1);
        assert_eq!(Difficulty::from_ordinal(3), Some(Difficulty::Hard));
        assert_eq!(Priority::from_ordinal(4), None);
        assert!(Priority::High > Priority::Low);
    }

    #[test]
    fn parses_status_and_priority_text() {
        assert_eq!("in-progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!("Done".parse::<TaskStatus>().unwrap(), TaskStatus::Done);
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn only_open_work_counts_against_budget() {
        assert!(TaskStatus::Pending.counts_against_budget());
        assert!(TaskStatus::InProgress.counts_against_budget());
        assert!(!TaskStatus::Done.counts_against_budget());
        assert!(!TaskStatus::Blocked.counts_against_budget());
    }

    #[test]
    fn urgency_band_by_deadline_then_priority() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut t = sample(now);
        t.priority = Priority::High;
        assert_eq!(t.urgency_band(now), UrgencyBand::HighPriority);

        t.deadline = Some(now - Duration::minutes(1));
        assert_eq!(t.urgency_band(now), UrgencyBand::Overdue);
        t.deadline = Some(now + Duration::hours(5));
        assert_eq!(t.urgency_band(now), UrgencyBand::Urgent);
        t.deadline = Some(now + Duration::hours(48));
        assert_eq!(t.urgency_band(now), UrgencyBand::Soon);
        t.deadline = Some(now + Duration::days(5));
        assert_eq!(t.urgency_band(now), UrgencyBand::Normal);
    }

    #[test]
    fn scheduled_duration_prefers_event_span() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut t = sample(now);
        assert_eq!(t.scheduled_duration(), Duration::minutes(60));

        t.kind = TaskKind::Concert;
        t.start_time = Some(now);
        t.end_time = Some(now + Duration::minutes(150));
        assert!(t.is_event());
        assert_eq!(t.scheduled_duration(), Duration::minutes(150));
    }

    #[test]
    fn patch_reports_cost_inputs() {
        let patch = TaskPatch {
            title: Some("renamed".into()),
            ..TaskPatch::default()
        };
        assert!(!patch.touches_cost());
        assert!(!patch.is_empty());

        let patch = TaskPatch {
            energy: Some(EnergyLevel::High),
            ..TaskPatch::default()
        };
        assert!(patch.touches_cost());
        assert!(TaskPatch::default().is_empty());
    }

    #[test]
    fn new_task_validation() {
        assert!(NewTask::new("  ").validate().is_err());
        assert!(NewTask::new("x").with_duration(-5).validate().is_err());
        assert!(NewTask::new("x").with_duration(0).validate().is_ok());
    }
}
