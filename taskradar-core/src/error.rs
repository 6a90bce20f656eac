//! Error taxonomy shared by the task graph, budget tracker and calendar.

use thiserror::Error;

use crate::calendar::RecurrenceKind;
use crate::task::TaskId;

/// Every failure a core operation can report to its caller.
///
/// Operations are all-or-nothing: when one of these is returned, the store
/// has not been mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("task {0} cannot be its own prerequisite")]
    SelfReference(TaskId),

    #[error("task {task} already depends on {prerequisite}")]
    DuplicateEdge { task: TaskId, prerequisite: TaskId },

    #[error("event {event_id} conflicts with existing events: {}", conflicts.join(", "))]
    Conflict {
        event_id: String,
        conflicts: Vec<String>,
    },

    #[error("{relation} {from} -> {to} would create a cycle")]
    Cycle {
        relation: &'static str,
        from: TaskId,
        to: TaskId,
    },

    #[error("recurrence type {0:?} cannot be expanded")]
    UnsupportedRecurrence(RecurrenceKind),

    #[error("too many recurring instances (limit: {0})")]
    RecurrenceLimit(usize),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn task_not_found(id: TaskId) -> Self {
        Self::NotFound {
            kind: "task",
            id: id.to_string(),
        }
    }

    pub fn event_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "event",
            id: id.into(),
        }
    }

    /// Stable machine-readable code, for outer layers mapping errors to responses.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::NotFound { .. } => "not_found",
            CoreError::SelfReference(_) => "self_reference",
            CoreError::DuplicateEdge { .. } => "duplicate_edge",
            CoreError::Conflict { .. } => "conflict",
            CoreError::Cycle { .. } => "cycle",
            CoreError::UnsupportedRecurrence(_) => "unsupported_recurrence",
            CoreError::RecurrenceLimit(_) => "recurrence_limit",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_lists_ids() {
        let err = CoreError::Conflict {
            event_id: "new".into(),
            conflicts: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "event new conflicts with existing events: a, b");
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(CoreError::task_not_found(7).to_string(), "task 7 not found");
        assert_eq!(CoreError::event_not_found("e1").kind(), "not_found");
    }
}
