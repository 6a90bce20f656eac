//! Daily coin budget.
//!
//! One record per calendar date, created lazily. Only the total is stored;
//! `spent` is recomputed from live tasks on every read.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::task::Task;

pub const DEFAULT_DAILY_COINS: i64 = 500;

/// Below this many remaining coins a day counts as running low.
pub const LOW_BUDGET_THRESHOLD: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Healthy,
    Low,
    OverBudget,
}

impl BudgetStatus {
    pub fn classify(remaining: i64) -> Self {
        if remaining < 0 {
            BudgetStatus::OverBudget
        } else if remaining < LOW_BUDGET_THRESHOLD {
            BudgetStatus::Low
        } else {
            BudgetStatus::Healthy
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BudgetStatus::Healthy => "healthy",
            BudgetStatus::Low => "low",
            BudgetStatus::OverBudget => "over_budget",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBudget {
    pub date: NaiveDate,
    pub total: i64,
    pub created_at: DateTime<Utc>,
}

/// What the budget widget shows for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetReport {
    pub date: NaiveDate,
    pub total: i64,
    pub spent: i64,
    pub remaining: i64,
    pub status: BudgetStatus,
    pub percent_spent: f64,
}

/// Sum of `money_cost` over pending and in-progress tasks.
pub fn spent_coins<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> i64 {
    tasks
        .into_iter()
        .filter(|t| t.status.counts_against_budget())
        .map(|t| t.money_cost)
        .sum()
}

/// Serializes only the per-day records; the default total comes from config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetTracker {
    #[serde(skip, default = "default_daily_coins")]
    default_total: i64,
    budgets: BTreeMap<NaiveDate, DailyBudget>,
}

fn default_daily_coins() -> i64 {
    DEFAULT_DAILY_COINS
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BudgetTracker {
    pub fn new() -> Self {
        Self {
            default_total: DEFAULT_DAILY_COINS,
            budgets: BTreeMap::new(),
        }
    }

    /// Total used for budgets created from now on.
    pub fn with_default_total(mut self, coins: i64) -> Self {
        self.set_default_total(coins);
        self
    }

    /// Existing days keep their totals.
    pub fn set_default_total(&mut self, coins: i64) {
        self.default_total = coins;
    }

    pub fn default_total(&self) -> i64 {
        self.default_total
    }

    pub fn budgets(&self) -> impl Iterator<Item = &DailyBudget> {
        self.budgets.values()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&DailyBudget> {
        self.budgets.get(&date)
    }

    pub fn get_or_create(&mut self, date: NaiveDate, now: DateTime<Utc>) -> &DailyBudget {
        let default_total = self.default_total;
        self.budgets.entry(date).or_insert_with(|| {
            tracing::debug!(%date, total = default_total, "daily budget created");
            DailyBudget {
                date,
                total: default_total,
                created_at: now,
            }
        })
    }

    /// Get-or-create the day's budget and derive spending from `tasks`.
    pub fn report<'a>(
        &mut self,
        date: NaiveDate,
        tasks: impl IntoIterator<Item = &'a Task>,
        now: DateTime<Utc>,
    ) -> BudgetReport {
        let total = self.get_or_create(date, now).total;
        let spent = spent_coins(tasks);
        let remaining = total - spent;
        let percent_spent = if total > 0 {
            spent as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        BudgetReport {
            date,
            total,
            spent,
            remaining,
            status: BudgetStatus::classify(remaining),
            percent_spent,
        }
    }

    pub fn set_total(&mut self, date: NaiveDate, coins: i64, now: DateTime<Utc>) -> CoreResult<DailyBudget> {
        if coins < 0 {
            return Err(CoreError::validation(format!(
                "daily budget must be >= 0 coins, got {coins}"
            )));
        }
        let budget = self.budgets.entry(date).or_insert_with(|| DailyBudget {
            date,
            total: coins,
            created_at: now,
        });
        budget.total = coins;
        tracing::debug!(%date, total = coins, "daily budget total set");
        Ok(budget.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskGraph;
    use crate::task::{NewTask, TaskStatus};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 6, 7, 30, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 6).unwrap()
    }

    #[test]
    fn thresholds() {
        assert_eq!(BudgetStatus::classify(-1), BudgetStatus::OverBudget);
        assert_eq!(BudgetStatus::classify(0), BudgetStatus::Low);
        assert_eq!(BudgetStatus::classify(99), BudgetStatus::Low);
        assert_eq!(BudgetStatus::classify(100), BudgetStatus::Healthy);
    }

    #[test]
    fn lazily_created_with_default_total() {
        let mut tracker = BudgetTracker::new();
        assert!(tracker.get(day()).is_none());
        let b = tracker.get_or_create(day(), now());
        assert_eq!(b.total, 500);

        let report = tracker.report(day(), std::iter::empty(), now());
        assert_eq!(report.spent, 0);
        assert_eq!(report.remaining, 500);
        assert_eq!(report.status, BudgetStatus::Healthy);
    }

    #[test]
    fn spent_counts_only_open_work() {
        let mut g = TaskGraph::new();
        g.create_task(NewTask::new("a").with_duration(150), now()).unwrap();
        let b = g.create_task(NewTask::new("b").with_duration(200), now()).unwrap();
        let done = g.create_task(NewTask::new("c").with_duration(500), now()).unwrap();
        g.set_status(b.id, TaskStatus::InProgress, now()).unwrap();
        g.set_status(done.id, TaskStatus::Done, now()).unwrap();

        let mut tracker = BudgetTracker::new();
        let report = tracker.report(day(), g.tasks(), now());
        assert_eq!(report.total, 500);
        assert_eq!(report.spent, 350);
        assert_eq!(report.remaining, 150);
        assert_eq!(report.status, BudgetStatus::Healthy);
        assert!((report.percent_spent - 70.0).abs() < 1e-9);
    }

    #[test]
    fn blocked_tasks_do_not_spend() {
        let mut g = TaskGraph::new();
        let t = g.create_task(NewTask::new("a").with_duration(600), now()).unwrap();
        assert_eq!(spent_coins(g.tasks()), 600);
        g.set_status(t.id, TaskStatus::Blocked, now()).unwrap();
        assert_eq!(spent_coins(g.tasks()), 0);
    }

    #[test]
    fn overspend_is_reported() {
        let mut g = TaskGraph::new();
        g.create_task(NewTask::new("a").with_duration(450), now()).unwrap();
        g.create_task(NewTask::new("b").with_duration(100), now()).unwrap();

        let mut tracker = BudgetTracker::new();
        let report = tracker.report(day(), g.tasks(), now());
        assert_eq!(report.remaining, -50);
        assert_eq!(report.status, BudgetStatus::OverBudget);
    }

    #[test]
    fn set_total_overrides_the_default() {
        let mut tracker = BudgetTracker::new().with_default_total(300);
        assert_eq!(tracker.get_or_create(day(), now()).total, 300);

        tracker.set_total(day(), 800, now()).unwrap();
        assert_eq!(tracker.report(day(), std::iter::empty(), now()).total, 800);
        assert!(tracker.set_total(day(), -1, now()).is_err());
        assert_eq!(tracker.get(day()).unwrap().total, 800);
    }
}
