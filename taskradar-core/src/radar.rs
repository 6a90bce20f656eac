//! Radar projection: places a task on a 2-D (urgency, weight) plane.
//!
//! - x: hours until the task's start time (or deadline, or a 24h default),
//!   scaled so one week spans 0..100. Past times clamp to 0.
//! - y: priority * 20 + energy * 15, capped at 100.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::Task;

const WEEK_HOURS: f64 = 168.0;
const DEFAULT_DISTANCE_HOURS: f64 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarPoint {
    pub x: f64,
    pub y: f64,
}

pub fn compute_radar_position(task: &Task, now: DateTime<Utc>) -> RadarPoint {
    let anchor = task.start_time.or(task.deadline);
    let hours = match anchor {
        Some(at) => (at - now).num_seconds() as f64 / 3600.0,
        None => DEFAULT_DISTANCE_HOURS,
    };

    let x = (hours / WEEK_HOURS * 100.0).clamp(0.0, 100.0);

    let priority_weight = f64::from(task.priority.ordinal()) * 20.0;
    let energy_weight = f64::from(task.energy.ordinal()) * 15.0;
    let y = (priority_weight + energy_weight).min(100.0);

    RadarPoint { x, y }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaskGraph;
    use crate::task::{EnergyLevel, NewTask, Priority};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 21, 8, 0, 0).unwrap()
    }

    fn task(new: NewTask) -> Task {
        let mut g = TaskGraph::new();
        g.create_task(new, now()).unwrap()
    }

    #[test]
    fn default_distance_is_one_day() {
        let p = compute_radar_position(&task(NewTask::new("a")), now());
        assert!((p.x - 24.0 / 168.0 * 100.0).abs() < 1e-9);
        // medium priority + medium energy
        assert_eq!(p.y, 70.0);
    }

    #[test]
    fn start_time_wins_over_deadline() {
        let t = task(
            NewTask::new("a")
                .with_start(now() + Duration::hours(84))
                .with_deadline(now() + Duration::hours(1)),
        );
        let p = compute_radar_position(&t, now());
        assert!((p.x - 50.0).abs() < 1e-9);
    }

    #[test]
    fn clamps_past_and_far_future() {
        let past = task(NewTask::new("a").with_deadline(now() - Duration::hours(3)));
        assert_eq!(compute_radar_position(&past, now()).x, 0.0);

        let far = task(NewTask::new("a").with_deadline(now() + Duration::days(30)));
        assert_eq!(compute_radar_position(&far, now()).x, 100.0);
    }

    #[test]
    fn weight_caps_at_hundred() {
        let t = task(
            NewTask::new("a")
                .with_priority(Priority::High)
                .with_energy(EnergyLevel::High),
        );
        assert_eq!(compute_radar_position(&t, now()).y, 100.0);

        let t = task(
            NewTask::new("a")
                .with_priority(Priority::Low)
                .with_energy(EnergyLevel::Low),
        );
        assert_eq!(compute_radar_position(&t, now()).y, 35.0);
    }
}
