//! taskradar-core: task graph, budget and calendar for the TaskRadar planner

pub mod budget;
pub mod calendar;
pub mod cost;
pub mod error;
pub mod graph;
pub mod radar;
pub mod task;
pub mod time;

pub use budget::{BudgetReport, BudgetStatus, BudgetTracker, DailyBudget, spent_coins};
pub use calendar::{
    Calendar, Event, RecurrenceEnd, RecurrenceKind, RecurrenceRule, SharedCalendar,
    generate_recurring_events,
};
pub use cost::compute_cost;
pub use error::{CoreError, CoreResult};
pub use graph::{PrerequisiteEdge, TaskDetail, TaskGraph, TaskGraphSnapshot};
pub use radar::{RadarPoint, compute_radar_position};
pub use task::{
    Difficulty, EnergyLevel, NewTask, Priority, Task, TaskId, TaskKind, TaskPatch, TaskStatus,
    UrgencyBand,
};
