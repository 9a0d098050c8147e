use std::time::Duration;

use rand::Rng;

/// Exponential backoff schedule, spec.md §4.3 defaults: max 3 retries,
/// initial delay 1000 ms, cap 10 000 ms, factor 2.
#[derive(Debug, Clone, Copy)]
pub struct RetrySchedule {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub cap: Duration,
    pub factor: f64,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            cap: Duration::from_millis(10_000),
            factor: 2.0,
        }
    }
}

/// `delay = min(cap, initial * factor^(attempt-1)) + uniform(-10%, +10%)`,
/// clamped to `>= 0`. `attempt` is the 1-indexed retry number about to run.
pub fn compute_delay(schedule: &RetrySchedule, attempt: u32, rng: &mut impl Rng) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let base_ms = schedule.initial_delay.as_secs_f64() * 1000.0 * schedule.factor.powi(exponent);
    let capped_ms = base_ms.min(schedule.cap.as_secs_f64() * 1000.0);
    let jitter_fraction = rng.gen_range(-0.10..=0.10);
    let jittered_ms = capped_ms + capped_ms * jitter_fraction;
    Duration::from_secs_f64(jittered_ms.max(0.0) / 1000.0)
}
