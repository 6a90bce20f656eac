use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use clap::Subcommand;
use std::collections::BTreeSet;

use taskradar_core::{
    Difficulty, EnergyLevel, NewTask, Priority, Task, TaskGraph, TaskId, TaskKind, TaskPatch,
    TaskStatus, UrgencyBand,
};

use crate::parse::{format_local, parse_date, parse_minutes, parse_time};
use crate::state::Session;

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Create a task; its coin cost is computed from the scoring attributes
    Add {
        title: String,

        #[arg(long)]
        description: Option<String>,

        /// task | appointment | event | concert | meeting
        #[arg(long)]
        kind: Option<String>,

        /// low | medium | high
        #[arg(long)]
        priority: Option<String>,

        /// 1-3
        #[arg(long)]
        energy: Option<u8>,

        /// 1-3
        #[arg(long)]
        difficulty: Option<u8>,

        /// e.g. 90m, 2h, 1h30m, 1d (default: 30m)
        #[arg(long)]
        estimate: Option<String>,

        /// Local deadline, "YYYY-MM-DD HH:MM"
        #[arg(long)]
        due: Option<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        #[arg(long)]
        parent: Option<TaskId>,

        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        location: Option<String>,
    },

    /// List tasks by priority, then deadline
    List {
        #[arg(long)]
        status: Option<String>,

        /// Only direct subtasks of this task
        #[arg(long, conflicts_with = "tree")]
        parent: Option<TaskId>,

        /// Show the parent/child hierarchy
        #[arg(long)]
        tree: bool,
    },

    /// Task with prerequisites, subtasks and radar position
    Show { id: TaskId },

    /// pending | in_progress | done | blocked
    Status { id: TaskId, status: String },

    Edit {
        id: TaskId,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        kind: Option<String>,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long)]
        energy: Option<u8>,

        #[arg(long)]
        difficulty: Option<u8>,

        #[arg(long)]
        estimate: Option<String>,

        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,

        #[arg(long)]
        clear_due: bool,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        #[arg(long, conflicts_with = "no_parent")]
        parent: Option<TaskId>,

        /// Detach from the current parent
        #[arg(long)]
        no_parent: bool,

        /// Replaces all tags
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        location: Option<String>,
    },

    /// Search title, description and location; subtasks of matches are included
    Search { text: String },

    /// Tasks starting or due within the next N days
    Upcoming {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },

    /// Radar coordinates: x = time distance (0 = now, 100 = a week+), y = weight
    Radar,
}

#[derive(Subcommand, Debug)]
pub enum PrereqCommand {
    /// TASK cannot be finished before PREREQ
    Add { task: TaskId, prereq: TaskId },

    Remove { task: TaskId, prereq: TaskId },

    /// Prerequisites and dependents of a task
    List { task: TaskId },
}

pub fn run_task(cmd: TaskCommand, session: &mut Session) -> Result<()> {
    let tz = session.tz;
    let now = session.now;

    match cmd {
        TaskCommand::Add {
            title,
            description,
            kind,
            priority,
            energy,
            difficulty,
            estimate,
            due,
            start,
            end,
            parent,
            tags,
            location,
        } => {
            let mut new = NewTask::new(title);
            if let Some(d) = description {
                new = new.with_description(d);
            }
            if let Some(k) = kind {
                new = new.with_kind(k.parse()?);
            }
            if let Some(p) = priority {
                new = new.with_priority(p.parse()?);
            }
            if let Some(e) = energy {
                new = new.with_energy(parse_energy(e)?);
            }
            if let Some(d) = difficulty {
                new = new.with_difficulty(parse_difficulty(d)?);
            }
            if let Some(est) = estimate {
                new = new.with_duration(parse_minutes(&est)?);
            }
            if let Some(d) = due {
                new = new.with_deadline(parse_time(&d, tz)?);
            }
            if let Some(s) = start {
                new = new.with_start(parse_time(&s, tz)?);
            }
            if let Some(e) = end {
                new = new.with_end(parse_time(&e, tz)?);
            }
            if let Some(p) = parent {
                new = new.with_parent(p);
            }
            for tag in tags {
                new = new.with_tag(tag);
            }
            if let Some(l) = location {
                new = new.with_location(l);
            }

            let task = session.workspace.graph.create_task(new, now)?;
            session.save()?;
            println!("Created task #{} (cost {} coins)", task.id, task.money_cost);
        }

        TaskCommand::List {
            status,
            parent,
            tree,
        } => {
            let graph = &session.workspace.graph;
            let status: Option<TaskStatus> = status.map(|s| s.parse()).transpose()?;

            if tree {
                for root in graph.all_tasks().into_iter().filter(|t| t.parent_id.is_none()) {
                    print_tree(graph, root, 0, status, tz)?;
                }
                return Ok(());
            }

            let tasks = match parent {
                Some(p) => graph.list_subtasks(p)?,
                None => graph.all_tasks(),
            };
            let mut shown = 0;
            for t in tasks.into_iter().filter(|t| status.is_none_or(|s| t.status == s)) {
                print_task_line(graph, t, 0, tz)?;
                shown += 1;
            }
            if shown == 0 {
                println!("No tasks.");
            }
        }

        TaskCommand::Show { id } => {
            let detail = session.workspace.graph.task_detail(id, now)?;
            let t = &detail.task;
            println!("#{} {}", t.id, t.title);
            if !t.description.is_empty() {
                println!("  {}", t.description);
            }
            println!("  kind:       {:?}", t.kind);
            println!("  status:     {}{}", t.status, if detail.blocked { " (blocked by prerequisites)" } else { "" });
            println!("  priority:   {:?}  energy: {:?}  difficulty: {:?}", t.priority, t.energy, t.difficulty);
            println!("  estimate:   {}m  cost: {} coins", t.estimated_duration, t.money_cost);
            if let Some(d) = t.deadline {
                println!("  due:        {} ({})", format_local(d, tz), band_label(t.urgency_band(now)));
            }
            if let Some(s) = t.start_time {
                println!("  starts:     {}", format_local(s, tz));
            }
            if let Some(e) = t.end_time {
                println!("  ends:       {}", format_local(e, tz));
            }
            if let Some(l) = &t.location {
                println!("  location:   {l}");
            }
            if !t.tags.is_empty() {
                let tags: Vec<&str> = t.tags.iter().map(String::as_str).collect();
                println!("  tags:       {}", tags.join(", "));
            }
            if let Some(p) = t.parent_id {
                println!("  parent:     #{p}");
            }
            println!("  radar:      x={:.1} y={:.1}", detail.radar.x, detail.radar.y);
            for p in &detail.prerequisites {
                println!("  needs:      #{} [{}] {}", p.id, p.status, p.title);
            }
            for s in &detail.subtasks {
                println!("  subtask:    #{} [{}] {}", s.id, s.status, s.title);
            }
        }

        TaskCommand::Status { id, status } => {
            let status: TaskStatus = status.parse()?;
            let task = session.workspace.graph.set_status(id, status, now)?;
            let blocked = session.workspace.graph.is_blocked(id)?;
            session.save()?;
            println!("#{} is now {}", task.id, task.status);
            if blocked && status != TaskStatus::Blocked {
                println!("note: #{} still has unfinished prerequisites", task.id);
            }
        }

        TaskCommand::Edit {
            id,
            title,
            description,
            kind,
            priority,
            energy,
            difficulty,
            estimate,
            due,
            clear_due,
            start,
            end,
            parent,
            no_parent,
            tags,
            location,
        } => {
            let patch = TaskPatch {
                title,
                description,
                kind: kind.map(|k| k.parse::<TaskKind>()).transpose()?,
                parent_id: match (parent, no_parent) {
                    (Some(p), _) => Some(Some(p)),
                    (None, true) => Some(None),
                    (None, false) => None,
                },
                estimated_duration: estimate.map(|e| parse_minutes(&e)).transpose()?,
                deadline: match (due, clear_due) {
                    (Some(d), _) => Some(Some(parse_time(&d, tz)?)),
                    (None, true) => Some(None),
                    (None, false) => None,
                },
                start_time: start.map(|s| parse_time(&s, tz)).transpose()?.map(Some),
                end_time: end.map(|e| parse_time(&e, tz)).transpose()?.map(Some),
                priority: priority.map(|p| p.parse::<Priority>()).transpose()?,
                energy: energy.map(parse_energy).transpose()?,
                difficulty: difficulty.map(parse_difficulty).transpose()?,
                tags: (!tags.is_empty()).then(|| tags.into_iter().collect::<BTreeSet<_>>()),
                location: location.map(Some),
            };
            if patch.is_empty() {
                bail!("nothing to change (see: taskradar task edit --help)");
            }

            let task = session.workspace.graph.update_task(id, patch, now)?;
            session.save()?;
            println!("Updated #{} (cost {} coins)", task.id, task.money_cost);
        }

        TaskCommand::Search { text } => {
            let graph = &session.workspace.graph;
            for t in graph.search_tasks(&text) {
                print_task_line(graph, t, 0, tz)?;
            }
        }

        TaskCommand::Upcoming { days } => {
            let graph = &session.workspace.graph;
            for t in graph.tasks_in_range(now, upcoming_end(now, days)?) {
                print_task_line(graph, t, 0, tz)?;
            }
        }

        TaskCommand::Radar => {
            for (t, p) in session.workspace.graph.radar(now) {
                println!("x={:>5.1} y={:>5.1}  #{} {}", p.x, p.y, t.id, t.title);
            }
        }
    }

    Ok(())
}

pub fn run_prereq(cmd: PrereqCommand, session: &mut Session) -> Result<()> {
    let graph = &mut session.workspace.graph;
    match cmd {
        PrereqCommand::Add { task, prereq } => {
            graph.add_prerequisite(task, prereq)?;
            let blocked = graph.is_blocked(task)?;
            session.save()?;
            println!(
                "#{task} now requires #{prereq}{}",
                if blocked { " (blocked)" } else { "" }
            );
        }
        PrereqCommand::Remove { task, prereq } => {
            graph.remove_prerequisite(task, prereq)?;
            session.save()?;
            println!("#{task} no longer requires #{prereq}");
        }
        PrereqCommand::List { task } => {
            let blocked = graph.is_blocked(task)?;
            println!("#{task} {}", if blocked { "is blocked" } else { "is not blocked" });
            for p in graph.list_prerequisites(task)? {
                println!("  needs    #{} [{}] {}", p.id, p.status, p.title);
            }
            for d in graph.list_dependents(task)? {
                println!("  unlocks  #{} [{}] {}", d.id, d.status, d.title);
            }
        }
    }
    Ok(())
}

pub fn run_budget(date: Option<String>, total: Option<i64>, session: &mut Session) -> Result<()> {
    let now = session.now;
    let date = match date {
        Some(d) => parse_date(&d)?,
        None => taskradar_core::time::local_date(now, session.tz),
    };

    let ws = &mut session.workspace;
    if let Some(coins) = total {
        ws.budgets.set_total(date, coins, now)?;
    }
    let report = ws.budgets.report(date, ws.graph.tasks(), now);
    session.save()?;

    println!("Budget for {}", report.date);
    println!("  total:     {:>6} coins", report.total);
    println!("  spent:     {:>6} coins ({:.0}%)", report.spent, report.percent_spent);
    println!("  remaining: {:>6} coins", report.remaining);
    println!("  status:    {}", report.status.as_str());
    Ok(())
}

fn upcoming_end(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|d| now.checked_add_signed(d))
        .with_context(|| format!("--days {days} is out of range"))
}

fn parse_energy(n: u8) -> Result<EnergyLevel> {
    EnergyLevel::from_ordinal(n).with_context(|| format!("energy must be 1-3, got {n}"))
}

fn parse_difficulty(n: u8) -> Result<Difficulty> {
    Difficulty::from_ordinal(n).with_context(|| format!("difficulty must be 1-3, got {n}"))
}

fn band_label(band: UrgencyBand) -> &'static str {
    match band {
        UrgencyBand::Overdue => "overdue",
        UrgencyBand::Urgent => "due within 24h",
        UrgencyBand::Soon => "due within 3 days",
        UrgencyBand::Normal => "on track",
        UrgencyBand::HighPriority => "high priority",
        UrgencyBand::MediumPriority => "medium priority",
        UrgencyBand::LowPriority => "low priority",
    }
}

fn print_task_line(graph: &TaskGraph, t: &Task, depth: usize, tz: Tz) -> Result<()> {
    let blocked = if graph.is_blocked(t.id)? { " BLOCKED" } else { "" };
    let due = due_label(t, tz)
        .map(|d| format!("  due {d}"))
        .unwrap_or_default();
    println!(
        "{}#{} [{}] {}  ({:?}, {}c){}{}",
        "  ".repeat(depth),
        t.id,
        t.status,
        t.title,
        t.priority,
        t.money_cost,
        due,
        blocked
    );
    Ok(())
}

fn print_tree(
    graph: &TaskGraph,
    t: &Task,
    depth: usize,
    status: Option<TaskStatus>,
    tz: Tz,
) -> Result<()> {
    if status.is_none_or(|s| t.status == s) {
        print_task_line(graph, t, depth, tz)?;
    }
    for child in graph.list_subtasks(t.id)? {
        print_tree(graph, child, depth + 1, status, tz)?;
    }
    Ok(())
}

fn due_label(t: &Task, tz: Tz) -> Option<String> {
    t.deadline.map(|d| format_local(d, tz))
}
