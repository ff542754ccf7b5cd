//! Jittered exponential backoff for publish retries.
//!
//! A [`BackoffPolicy`] is created fresh for every retry loop and handed back
//! one delay per failed attempt until the retry budget runs out.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::errors::{RabbitMQError, Result};

/// What to do once the previous delay reached `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CeilingBehavior {
    /// Next delay is `max_delay * uniform(min_jitter, max_jitter)`, so the
    /// curve drops back below the ceiling and climbs again.
    #[default]
    Jitter,
    /// Next delay is exactly `max_delay`.
    Hold,
}

/// Retry budget and delay curve.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Retries after the initial attempt.
    pub retries: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub min_jitter: f64,
    pub max_jitter: f64,
    /// Growth factor applied while below `max_delay`; must be at least 1.
    pub factor: f64,
    pub ceiling: CeilingBehavior,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            min_jitter: 0.1,
            max_jitter: 0.4,
            factor: 2.0,
            ceiling: CeilingBehavior::Jitter,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_delay > self.max_delay {
            return Err(RabbitMQError::ConfigError(format!(
                "backoff min_delay {:?} exceeds max_delay {:?}",
                self.min_delay, self.max_delay
            )));
        }
        if !(self.min_jitter >= 0.0 && self.min_jitter <= self.max_jitter) || !self.max_jitter.is_finite() {
            return Err(RabbitMQError::ConfigError(format!(
                "backoff jitter range [{}, {}] is invalid",
                self.min_jitter, self.max_jitter
            )));
        }
        if !(self.factor >= 1.0 && self.factor.is_finite()) {
            return Err(RabbitMQError::ConfigError(format!(
                "backoff factor {} must be at least 1",
                self.factor
            )));
        }
        let growth = self.factor + self.max_jitter;
        if Duration::try_from_secs_f64(self.max_delay.as_secs_f64() * growth).is_err() {
            return Err(RabbitMQError::ConfigError(format!(
                "backoff max_delay {:?} is too large to grow by {}",
                self.max_delay, growth
            )));
        }
        Ok(())
    }
}

/// Outcome of [`BackoffPolicy::next_delay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delay {
    Wait(Duration),
    Exhausted,
}

#[derive(Debug)]
pub struct BackoffPolicy<R = StdRng> {
    config: BackoffConfig,
    attempt: u32,
    current: Option<Duration>,
    rng: R,
}

impl BackoffPolicy<StdRng> {
    pub fn new(config: BackoffConfig) -> Self {
        Self::with_rng(config, StdRng::from_rng(&mut rand::rng()))
    }
}

impl<R: Rng> BackoffPolicy<R> {
    pub fn with_rng(config: BackoffConfig, rng: R) -> Self {
        Self {
            config,
            attempt: 0,
            current: None,
            rng,
        }
    }

    /// Number of delays handed out so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Delay before the next retry, or [`Delay::Exhausted`] once `retries`
    /// delays have been produced.
    pub fn next_delay(&mut self) -> Delay {
        if self.attempt >= self.config.retries {
            return Delay::Exhausted;
        }

        let jitter = self.jitter();
        let next = match self.current {
            None => scale(self.config.min_delay, jitter),
            Some(previous) if previous >= self.config.max_delay => match self.config.ceiling {
                CeilingBehavior::Jitter => scale(self.config.max_delay, jitter),
                CeilingBehavior::Hold => self.config.max_delay,
            },
            Some(previous) => {
                scale(previous, self.config.factor).saturating_add(scale(previous, jitter))
            }
        };

        self.attempt += 1;
        self.current = Some(next);
        Delay::Wait(next)
    }

    fn jitter(&mut self) -> f64 {
        self.rng
            .random_range(self.config.min_jitter..=self.config.max_jitter)
    }
}

/// `duration * factor`, saturating at `Duration::MAX`.
fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
