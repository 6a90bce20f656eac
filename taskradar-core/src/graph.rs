//! Task graph store: tasks, the parent/child forest and the prerequisite DAG.
//!
//! Design:
//! - Canonical task copies live in a map (id -> Task), ordered by id.
//! - Prerequisite edges are an adjacency map (task -> set of prerequisites).
//!   The relation is independent of the parent/child tree.
//! - Both relations are kept acyclic at insertion time: a parent may not be a
//!   descendant, and an edge A -> B is refused when B already reaches A.
//! - "Blocked" is derived from prerequisite statuses and never written back
//!   into the stored `status` field. The two signals may disagree.
//!
//! All operations are all-or-nothing; callers serialize writers externally.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::radar::RadarPoint;
use crate::task::{NewTask, Task, TaskId, TaskPatch, TaskStatus, validate_span};

/// Ordered pair: `task_id` requires `prerequisite_id` to be done first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrerequisiteEdge {
    pub task_id: TaskId,
    pub prerequisite_id: TaskId,
}

/// Persistable form of the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGraphSnapshot {
    pub next_id: TaskId,
    pub tasks: Vec<Task>,
    pub prerequisites: Vec<PrerequisiteEdge>,
}

/// A task with its loaded relations, as shown by detail views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDetail {
    pub task: Task,
    pub prerequisites: Vec<Task>,
    pub subtasks: Vec<Task>,
    pub blocked: bool,
    pub radar: RadarPoint,
}

#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: BTreeMap<TaskId, Task>,

    // prerequisites[task] = set(prerequisite ids)
    prerequisites: BTreeMap<TaskId, BTreeSet<TaskId>>,

    next_id: TaskId,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in id order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn get_task(&self, id: TaskId) -> CoreResult<&Task> {
        self.tasks.get(&id).ok_or_else(|| CoreError::task_not_found(id))
    }

    pub fn create_task(&mut self, new: NewTask, now: DateTime<Utc>) -> CoreResult<Task> {
        new.validate()?;
        if let Some(parent) = new.parent_id {
            self.get_task(parent)?;
        }

        self.next_id += 1;
        let mut task = Task {
            id: self.next_id,
            title: new.title,
            description: new.description,
            kind: new.kind,
            parent_id: new.parent_id,
            estimated_duration: new.estimated_duration,
            deadline: new.deadline,
            start_time: new.start_time,
            end_time: new.end_time,
            priority: new.priority,
            status: TaskStatus::Pending,
            energy: new.energy,
            difficulty: new.difficulty,
            tags: new.tags,
            money_cost: 0,
            location: new.location,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        task.recompute_cost();

        tracing::debug!(task_id = task.id, cost = task.money_cost, "task created");
        self.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    pub fn update_task(&mut self, id: TaskId, patch: TaskPatch, now: DateTime<Utc>) -> CoreResult<Task> {
        let current = self.get_task(id)?;
        patch.validate()?;

        if let Some(Some(parent)) = patch.parent_id {
            self.get_task(parent)?;
            if self.is_ancestor_or_self(id, parent) {
                return Err(CoreError::Cycle {
                    relation: "parent",
                    from: id,
                    to: parent,
                });
            }
        }

        let touches_cost = patch.touches_cost();
        let mut updated = current.clone();
        patch.apply(&mut updated);
        validate_span(updated.start_time, updated.end_time)?;

        updated.recompute_cost();
        updated.updated_at = now;

        tracing::debug!(task_id = id, touches_cost, cost = updated.money_cost, "task updated");
        self.tasks.insert(id, updated.clone());
        Ok(updated)
    }

    /// Reopening a done task clears `completed_at`; completing keeps the first
    /// completion time if the task was already done.
    pub fn set_status(&mut self, id: TaskId, status: TaskStatus, now: DateTime<Utc>) -> CoreResult<Task> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| CoreError::task_not_found(id))?;

        let was_done = task.status == TaskStatus::Done;
        task.status = status;
        task.updated_at = now;
        match (status, was_done) {
            (TaskStatus::Done, false) => task.completed_at = Some(now),
            (TaskStatus::Done, true) => {}
            _ => task.completed_at = None,
        }

        tracing::debug!(task_id = id, status = %status, "task status set");
        Ok(task.clone())
    }

    pub fn add_prerequisite(&mut self, task_id: TaskId, prerequisite_id: TaskId) -> CoreResult<()> {
        self.get_task(task_id)?;
        self.get_task(prerequisite_id)?;

        if task_id == prerequisite_id {
            return Err(CoreError::SelfReference(task_id));
        }
        if self.has_prerequisite(task_id, prerequisite_id) {
            return Err(CoreError::DuplicateEdge {
                task: task_id,
                prerequisite: prerequisite_id,
            });
        }
        if self.would_create_cycle(task_id, prerequisite_id) {
            return Err(CoreError::Cycle {
                relation: "prerequisite",
                from: task_id,
                to: prerequisite_id,
            });
        }

        self.prerequisites
            .entry(task_id)
            .or_default()
            .insert(prerequisite_id);
        tracing::debug!(task_id, prerequisite_id, "prerequisite added");
        Ok(())
    }

    pub fn remove_prerequisite(&mut self, task_id: TaskId, prerequisite_id: TaskId) -> CoreResult<()> {
        let removed = self
            .prerequisites
            .get_mut(&task_id)
            .is_some_and(|set| set.remove(&prerequisite_id));
        if !removed {
            return Err(CoreError::NotFound {
                kind: "prerequisite edge",
                id: format!("{task_id}->{prerequisite_id}"),
            });
        }

        if self.prerequisites.get(&task_id).is_some_and(BTreeSet::is_empty) {
            self.prerequisites.remove(&task_id);
        }
        tracing::debug!(task_id, prerequisite_id, "prerequisite removed");
        Ok(())
    }

    pub fn has_prerequisite(&self, task_id: TaskId, prerequisite_id: TaskId) -> bool {
        self.prerequisites
            .get(&task_id)
            .is_some_and(|set| set.contains(&prerequisite_id))
    }

    /// Would the edge `task_id -> prerequisite_id` close a cycle?
    ///
    /// True when `prerequisite_id` already reaches `task_id` through existing
    /// prerequisite edges (or the two are the same task).
    pub fn would_create_cycle(&self, task_id: TaskId, prerequisite_id: TaskId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![prerequisite_id];

        while let Some(current) = stack.pop() {
            if current == task_id {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(next) = self.prerequisites.get(&current) {
                stack.extend(next.iter().filter(|id| !visited.contains(*id)));
            }
        }

        false
    }

    /// Derived: true iff any prerequisite is not done.
    pub fn is_blocked(&self, id: TaskId) -> CoreResult<bool> {
        self.get_task(id)?;
        let blocked = self
            .prerequisites
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|p| self.tasks.get(p))
            .any(|p| p.status != TaskStatus::Done);
        Ok(blocked)
    }

    /// Direct children, oldest first.
    pub fn list_subtasks(&self, parent_id: TaskId) -> CoreResult<Vec<&Task>> {
        self.get_task(parent_id)?;
        let mut out: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.parent_id == Some(parent_id))
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    pub fn list_prerequisites(&self, task_id: TaskId) -> CoreResult<Vec<&Task>> {
        self.get_task(task_id)?;
        Ok(self
            .prerequisites
            .get(&task_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.tasks.get(id))
            .collect())
    }

    /// Tasks that list `task_id` as a prerequisite.
    pub fn list_dependents(&self, task_id: TaskId) -> CoreResult<Vec<&Task>> {
        self.get_task(task_id)?;
        Ok(self
            .prerequisites
            .iter()
            .filter(|(_, set)| set.contains(&task_id))
            .filter_map(|(id, _)| self.tasks.get(id))
            .collect())
    }

    /// Every task: priority desc, then deadline asc with missing deadlines last.
    pub fn all_tasks(&self) -> Vec<&Task> {
        let mut out: Vec<&Task> = self.tasks.values().collect();
        out.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| cmp_none_last(&a.deadline, &b.deadline))
                .then(a.id.cmp(&b.id))
        });
        out
    }

    pub fn task_detail(&self, id: TaskId, now: DateTime<Utc>) -> CoreResult<TaskDetail> {
        let task = self.get_task(id)?;
        Ok(TaskDetail {
            task: task.clone(),
            prerequisites: self.list_prerequisites(id)?.into_iter().cloned().collect(),
            subtasks: self.list_subtasks(id)?.into_iter().cloned().collect(),
            blocked: self.is_blocked(id)?,
            radar: task.radar_position(now),
        })
    }

    /// Radar points for every task, in `all_tasks` order.
    pub fn radar(&self, now: DateTime<Utc>) -> Vec<(&Task, RadarPoint)> {
        self.all_tasks()
            .into_iter()
            .map(|t| (t, t.radar_position(now)))
            .collect()
    }

    /// Case-insensitive substring match over title, description and location.
    /// Every descendant of a match is included too.
    pub fn search_tasks(&self, query: &str) -> Vec<&Task> {
        let needle = query.to_lowercase();
        let mut found: BTreeSet<TaskId> = self
            .tasks
            .values()
            .filter(|t| {
                t.title.to_lowercase().contains(&needle)
                    || t.description.to_lowercase().contains(&needle)
                    || t.location
                        .as_deref()
                        .is_some_and(|l| l.to_lowercase().contains(&needle))
            })
            .map(|t| t.id)
            .collect();

        let mut queue: VecDeque<TaskId> = found.iter().copied().collect();
        while let Some(parent) = queue.pop_front() {
            for child in self.tasks.values().filter(|t| t.parent_id == Some(parent)) {
                if found.insert(child.id) {
                    queue.push_back(child.id);
                }
            }
        }

        let mut out: Vec<&Task> = found.iter().filter_map(|id| self.tasks.get(id)).collect();
        out.sort_by(|a, b| {
            cmp_none_last(&a.start_time, &b.start_time)
                .then_with(|| cmp_none_last(&a.deadline, &b.deadline))
                .then(a.id.cmp(&b.id))
        });
        out
    }

    /// Tasks whose start time or deadline falls within `[start, end]`.
    pub fn tasks_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&Task> {
        let within = |at: Option<DateTime<Utc>>| at.is_some_and(|at| start <= at && at <= end);
        let mut out: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| within(t.start_time) || within(t.deadline))
            .collect();
        out.sort_by(|a, b| {
            cmp_none_last(&a.start_time.or(a.deadline), &b.start_time.or(b.deadline))
                .then(a.id.cmp(&b.id))
        });
        out
    }

    pub fn snapshot(&self) -> TaskGraphSnapshot {
        TaskGraphSnapshot {
            next_id: self.next_id,
            tasks: self.tasks.values().cloned().collect(),
            prerequisites: self
                .prerequisites
                .iter()
                .flat_map(|(task_id, set)| {
                    set.iter().map(|p| PrerequisiteEdge {
                        task_id: *task_id,
                        prerequisite_id: *p,
                    })
                })
                .collect(),
        }
    }

    /// Rebuild a graph, re-checking every invariant and recomputing stale costs.
    pub fn from_snapshot(snapshot: TaskGraphSnapshot) -> CoreResult<Self> {
        let mut graph = TaskGraph::new();

        for mut task in snapshot.tasks {
            if task.title.trim().is_empty() {
                return Err(CoreError::validation(format!("task {} has an empty title", task.id)));
            }
            if task.estimated_duration < 0 {
                return Err(CoreError::validation(format!(
                    "task {} has a negative duration",
                    task.id
                )));
            }
            task.recompute_cost();
            if graph.tasks.insert(task.id, task).is_some() {
                return Err(CoreError::validation("duplicate task id in snapshot"));
            }
        }

        for task in graph.tasks.values() {
            if let Some(parent) = task.parent_id {
                graph.get_task(parent)?;
                if graph.parent_chain_loops(task.id) {
                    return Err(CoreError::Cycle {
                        relation: "parent",
                        from: task.id,
                        to: parent,
                    });
                }
            }
        }

        let max_id = graph.tasks.keys().next_back().copied().unwrap_or(0);
        graph.next_id = snapshot.next_id.max(max_id);

        for edge in snapshot.prerequisites {
            graph.add_prerequisite(edge.task_id, edge.prerequisite_id)?;
        }

        Ok(graph)
    }

    /// Is `id` equal to `candidate` or one of its ancestors?
    fn is_ancestor_or_self(&self, id: TaskId, candidate: TaskId) -> bool {
        let mut cursor = Some(candidate);
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == id {
                return true;
            }
            steps += 1;
            if steps > self.tasks.len() {
                // Only reachable if the tree invariant was already broken.
                return true;
            }
            cursor = self.tasks.get(&current).and_then(|t| t.parent_id);
        }
        false
    }

    fn parent_chain_loops(&self, id: TaskId) -> bool {
        let mut seen = HashSet::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if !seen.insert(current) {
                return true;
            }
            cursor = self.tasks.get(&current).and_then(|t| t.parent_id);
        }
        false
    }
}

fn cmp_none_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
