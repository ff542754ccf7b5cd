//! Retry decisions shared by the blocking and cooperative publishers.
//!
//! [`RetryLoop`] does no I/O and never sleeps. Each adapter runs the attempt,
//! feeds failures in, and performs the returned [`Step`] its own way.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;

use super::backoff::{BackoffConfig, BackoffPolicy, Delay};
use super::errors::RabbitMQError;

#[derive(Debug)]
pub enum Step {
    /// Suspend for the delay, reconnect if needed, then try again.
    Retry(Duration),
    /// Stop and surface the error to the caller.
    Fail(RabbitMQError),
}

#[derive(Debug)]
pub struct RetryLoop<R = StdRng> {
    backoff: BackoffPolicy<R>,
    attempts: u32,
}

impl RetryLoop<StdRng> {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            backoff: BackoffPolicy::new(config),
            attempts: 0,
        }
    }
}

impl<R: Rng> RetryLoop<R> {
    pub fn with_policy(backoff: BackoffPolicy<R>) -> Self {
        Self { backoff, attempts: 0 }
    }

    /// Attempts that have failed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn on_failure(&mut self, error: RabbitMQError) -> Step {
        self.attempts += 1;

        if !error.is_transient() {
            return Step::Fail(error);
        }

        match self.backoff.next_delay() {
            Delay::Wait(delay) => Step::Retry(delay),
            Delay::Exhausted => Step::Fail(RabbitMQError::PublishFailed {
                attempts: self.attempts,
                source: Box::new(error),
            }),
        }
    }
}
