//! In-memory workspace and its on-disk document shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskradar_core::{BudgetTracker, Calendar, Event, TaskGraph, TaskGraphSnapshot};

use crate::error::{StoreError, StoreResult};

pub const FORMAT_VERSION: &str = "1.0";

/// Everything the planner owns: tasks, daily budgets and the calendar.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub graph: TaskGraph,
    pub budgets: BudgetTracker,
    pub calendar: Calendar,
}

/// Serialized form of a [`Workspace`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceDocument {
    pub version: String,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub tasks: TaskGraphSnapshot,
    #[serde(default)]
    pub budgets: BudgetTracker,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Calendar-only export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarDocument {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub events: Vec<Event>,
}

pub(crate) fn check_version(version: &str) -> StoreResult<()> {
    if version.split('.').next() == FORMAT_VERSION.split('.').next() {
        Ok(())
    } else {
        Err(StoreError::UnsupportedVersion(version.to_string()))
    }
}

impl Workspace {
    pub fn to_document(&self, now: DateTime<Utc>) -> WorkspaceDocument {
        WorkspaceDocument {
            version: FORMAT_VERSION.to_string(),
            saved_at: now,
            tasks: self.graph.snapshot(),
            budgets: self.budgets.clone(),
            events: self.calendar.all_events().into_iter().cloned().collect(),
        }
    }

    /// Rebuild from a document, re-checking task graph and event invariants.
    pub fn from_document(doc: WorkspaceDocument) -> StoreResult<Self> {
        check_version(&doc.version)?;
        Ok(Self {
            graph: TaskGraph::from_snapshot(doc.tasks)?,
            budgets: doc.budgets,
            calendar: Calendar::from_events(doc.events)?,
        })
    }
}
