use std::time::{Duration, Instant};

use crate::config::BackoffConfig;

/// Exponential backoff state yielding successive retry intervals.
///
/// Each call to [`next`](Iterator::next) returns the current interval and then
/// grows it by the multiplier, capped at `max_interval`. Iteration ends once
/// waiting the next interval would cross the elapsed-time budget.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed: Duration,
    started: Instant,
}

impl Backoff {
    pub fn new(config: &BackoffConfig, max_elapsed: Duration) -> Self {
        Self {
            current: config.initial_interval,
            multiplier: config.multiplier,
            max_interval: config.max_interval,
            max_elapsed,
            started: Instant::now(),
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let interval = self.current.min(self.max_interval);
        if self.started.elapsed() + interval > self.max_elapsed {
            return None;
        }
        let grown = (self.current.as_nanos() as f64 * self.multiplier).round() as u64;
        self.current = Duration::from_nanos(grown).min(self.max_interval);
        Some(interval)
    }
}
