//! Delivery-time bucket to simulation step count.

use once_cell::sync::Lazy;
use regex::Regex;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("number pattern is a valid regex"));

/// Days assumed when a pace string carries no usable number.
pub const DEFAULT_PACE_DAYS: f64 = 3.0;

/// Simulation steps per simulated day (one step per two hours).
pub const STEPS_PER_DAY: f64 = 12.0;

/// Parses a delivery-time bucket such as `"next-day"`, `"2 days"` or
/// `"3-5 days"` into a day count.
///
/// Two numbers are averaged; anything beyond the second is ignored.
pub fn pace_days(pace: &str) -> f64 {
    if pace.to_ascii_lowercase().contains("next-day") {
        return 1.0;
    }

    let numbers: Vec<f64> = NUMBER_RE
        .find_iter(pace)
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .take(2)
        .collect();

    match numbers.as_slice() {
        [one] => *one,
        [low, high] => (low + high) / 2.0,
        _ => DEFAULT_PACE_DAYS,
    }
}

/// `ceil(days * 12)`, never below `min_steps`.
pub fn step_count(days: f64, min_steps: usize) -> usize {
    let steps = (days * STEPS_PER_DAY).ceil();
    if steps.is_finite() && steps > 0.0 {
        (steps as usize).max(min_steps)
    } else {
        min_steps
    }
}

/// Step count for a pace string.
pub fn steps_for_pace(pace: &str, min_steps: usize) -> usize {
    step_count(pace_days(pace), min_steps)
}
