//! Bounded retry with exponential backoff, as a transport-independent state machine.
//!
//! The caller drives the machine: start an attempt, report its outcome, and
//! either sleep for the returned delay or stop. No clock or I/O lives here.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `attempt` (1-indexed) has failed: `initial * 2^(attempt-1)`, capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// What the caller should do after reporting a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for the delay, then start another attempt.
    RetryAfter(Duration),
    /// Stop and surface the last error.
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Number of attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record the start of a new attempt and return its 1-indexed number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Report that the current attempt failed.
    ///
    /// Non-retryable failures stop immediately; retryable ones continue until
    /// the attempt budget is exhausted.
    pub fn on_failure(&mut self, retryable: bool) -> RetryDecision {
        if !retryable || self.attempts >= self.policy.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.policy.delay_after(self.attempts))
    }
}
