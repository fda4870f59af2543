use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;

use crate::config::SimulationConfig;

/// Supplies the random draws a driver needs on each tick.
pub trait ProgressSource: Send + Sync {
    /// Progress to add on the next tick.
    fn next_increment(&self) -> f64;

    /// Wait before the following tick.
    fn next_delay(&self) -> Duration;
}

/// Thread-RNG backed source: uniform increment in `[0, max_increment)` and
/// uniform delay in `[delay_min, delay_min + delay_jitter)`.
#[derive(Debug, Clone)]
pub struct RandomSource {
    max_increment: f64,
    delay_min: Duration,
    delay_jitter: Duration,
}

impl RandomSource {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            max_increment: config.max_increment,
            delay_min: Duration::from_millis(config.tick_min_ms),
            delay_jitter: Duration::from_millis(config.tick_jitter_ms),
        }
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::new(&SimulationConfig::default())
    }
}

impl ProgressSource for RandomSource {
    fn next_increment(&self) -> f64 {
        if self.max_increment <= 0.0 {
            return 0.0;
        }
        rand::thread_rng().gen_range(0.0..self.max_increment)
    }

    fn next_delay(&self) -> Duration {
        if self.delay_jitter.is_zero() {
            return self.delay_min;
        }
        self.delay_min + rand::thread_rng().gen_range(Duration::ZERO..self.delay_jitter)
    }
}

/// Deterministic source: replays queued increments, then repeats `fallback`.
/// Every delay is the same fixed value.
#[derive(Debug)]
pub struct ScriptedSource {
    increments: Mutex<VecDeque<f64>>,
    fallback: f64,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new(increments: impl IntoIterator<Item = f64>) -> Self {
        Self {
            increments: Mutex::new(increments.into_iter().collect()),
            fallback: 10.0,
            delay: Duration::from_millis(1000),
        }
    }

    /// Increment used once the queue is drained.
    pub fn with_fallback(mut self, fallback: f64) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl ProgressSource for ScriptedSource {
    fn next_increment(&self) -> f64 {
        match self.increments.lock() {
            Ok(mut queue) => queue.pop_front().unwrap_or(self.fallback),
            Err(poisoned) => poisoned.into_inner().pop_front().unwrap_or(self.fallback),
        }
    }

    fn next_delay(&self) -> Duration {
        self.delay
    }
}
