//! Cost model: converts a task's attributes into budget coins.
//!
//! cost = floor(duration_minutes * energy * difficulty * priority)
//!
//! Ordinals outside 1..=3 fall through to the neutral 1.0 factor; callers
//! validate ordinals upstream.

pub fn energy_factor(energy: u8) -> f64 {
    match energy {
        1 => 0.8,
        3 => 1.5,
        _ => 1.0,
    }
}

pub fn difficulty_factor(difficulty: u8) -> f64 {
    match difficulty {
        1 => 0.9,
        3 => 1.3,
        _ => 1.0,
    }
}

/// Higher priority costs more to reflect urgency.
pub fn priority_factor(priority: u8) -> f64 {
    match priority {
        1 => 0.8,
        3 => 1.2,
        _ => 1.0,
    }
}

pub fn compute_cost(duration_minutes: i32, energy: u8, difficulty: u8, priority: u8) -> i64 {
    let cost = f64::from(duration_minutes)
        * energy_factor(energy)
        * difficulty_factor(difficulty)
        * priority_factor(priority);
    cost.floor() as i64
}
