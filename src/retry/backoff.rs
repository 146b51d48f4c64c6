//! Exponential backoff with randomization.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Backoff shape. Bad parameters are rejected when a [`Backoff`] is built,
/// never at use time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// First interval, milliseconds.
    pub initial_ms: u64,
    /// Growth factor per step; must be at least 1.
    pub multiplier: f64,
    /// Randomization factor r in [0, 1): intervals are drawn uniformly from
    /// [current·(1−r), current·(1+r)], bounds inclusive.
    pub randomization: f64,
    /// Ceiling for the underlying interval, milliseconds.
    pub max_interval_ms: u64,
    /// Total budget; `next` returns Stop once this much time has elapsed
    /// since the last reset.
    pub max_elapsed_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            multiplier: 1.5,
            randomization: 0.5,
            max_interval_ms: 60_000,
            max_elapsed_ms: 900_000,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_ms == 0 {
            return Err(Error::InvalidConfiguration(
                "backoff initial interval must be positive".to_string(),
            ));
        }
        if self.multiplier < 1.0 {
            return Err(Error::InvalidConfiguration(format!(
                "backoff multiplier {} must be at least 1",
                self.multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.randomization) {
            return Err(Error::InvalidConfiguration(format!(
                "backoff randomization {} must be in [0, 1)",
                self.randomization
            )));
        }
        if self.max_interval_ms < self.initial_ms {
            return Err(Error::InvalidConfiguration(
                "backoff max interval must not be below the initial interval".to_string(),
            ));
        }
        if self.max_elapsed_ms == 0 {
            return Err(Error::InvalidConfiguration(
                "backoff max elapsed time must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// What the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    /// Sleep this long, then retry.
    Wait(Duration),
    /// The elapsed-time budget is spent; give up.
    Stop,
}

/// Stateful interval calculator. Pure apart from its own fields: the clock
/// and RNG are injected, so tests drive it deterministically. It never
/// sleeps; the caller honors the returned interval.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    /// Underlying interval in ms; only grows (capped) until `reset`.
    current_ms: f64,
    started_at: Instant,
}

impl Backoff {
    pub fn new(config: BackoffConfig, now: Instant) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            current_ms: config.initial_ms as f64,
            config,
            started_at: now,
        })
    }

    /// The next interval, or Stop once elapsed time exceeds the budget.
    /// Advances the underlying interval by the multiplier, capped at the
    /// maximum.
    pub fn next(&mut self, now: Instant, rng: &mut impl Rng) -> BackoffDecision {
        let elapsed = now.duration_since(self.started_at);
        if elapsed > Duration::from_millis(self.config.max_elapsed_ms) {
            return BackoffDecision::Stop;
        }

        let r = self.config.randomization;
        let interval_ms = if r > 0.0 {
            let low = self.current_ms * (1.0 - r);
            let high = self.current_ms * (1.0 + r);
            rng.gen_range(low..=high)
        } else {
            self.current_ms
        };

        self.current_ms =
            (self.current_ms * self.config.multiplier).min(self.config.max_interval_ms as f64);
        BackoffDecision::Wait(Duration::from_millis(interval_ms.round() as u64))
    }

    /// Restore the initial interval and restart the elapsed-time clock.
    pub fn reset(&mut self, now: Instant) {
        self.current_ms = self.config.initial_ms as f64;
        self.started_at = now;
    }

    /// The underlying interval the next draw will center on (test hook for
    /// the monotonicity invariant).
    pub fn current_interval(&self) -> Duration {
        Duration::from_millis(self.current_ms.round() as u64)
    }
}
