//! Bounded exponential-backoff retry
//!
//! The loop state lives in [`RetryState`] rather than in closure captures, and
//! sleeping goes through the [`Sleeper`] trait, so the schedule can be tested
//! with a recording clock instead of real waits.
//!
//! Only errors whose [`Transient::is_transient`] returns true are retried. The
//! last error is handed back unchanged once attempts run out, so callers can
//! still tell "gave up on the network" apart from "validation failed".

use crate::error::FetchError;
use crate::output;
use std::fmt::Display;
use std::time::Duration;

/// Classification used to decide whether an error is worth another attempt.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for FetchError {
    fn is_transient(&self) -> bool {
        FetchError::is_transient(self)
    }
}

/// Blocking wait between attempts.
pub trait Sleeper {
    fn sleep(&self, wait: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, wait: Duration) {
        std::thread::sleep(wait);
    }
}

/// Attempt limit and wait schedule.
///
/// The wait after failed attempt `n` (1-based) is
/// `clamp(base * 2^(n-1), min_wait, max_wait)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_wait: Duration,
    min_wait: Duration,
    max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
            base_wait: Duration::from_secs(1),
            min_wait: Duration::from_secs(4),
            max_wait: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Default schedule with a custom attempt limit (at least one).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Replace the wait schedule. A `min` above `max` is lowered to `max`.
    pub fn with_waits(mut self, base: Duration, min: Duration, max: Duration) -> Self {
        self.base_wait = base;
        self.max_wait = max;
        self.min_wait = min.min(max);
        self
    }

    /// Same wait schedule with a different attempt limit (at least one).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait that follows failed attempt `attempt` (1-based).
    pub fn wait_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_wait
            .saturating_mul(factor)
            .max(self.min_wait)
            .min(self.max_wait)
    }

    /// Fresh per-call state.
    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            attempt: 0,
            next_wait: None,
        }
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, E, F>(&self, sleeper: &dyn Sleeper, mut op: F) -> Result<T, E>
    where
        E: Transient + Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut state = self.start();
        loop {
            let attempt = state.begin();
            let err = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match state.on_failure(err.is_transient()) {
                Verdict::Retry(wait) => {
                    output::detail(&format!(
                        "attempt {}/{} failed: {}; retrying in {}s",
                        attempt,
                        self.max_attempts,
                        err,
                        wait.as_secs_f32()
                    ));
                    sleeper.sleep(wait);
                }
                Verdict::GiveUp => return Err(err),
            }
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Retry(Duration),
    GiveUp,
}

/// Attempt counter and pending wait for one wrapped call.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
    next_wait: Option<Duration>,
}

impl RetryState {
    /// Mark the start of the next attempt and return its 1-based number.
    pub fn begin(&mut self) -> u32 {
        self.attempt += 1;
        self.next_wait = None;
        self.attempt
    }

    /// Attempts started so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Wait scheduled by the last [`on_failure`](Self::on_failure), if any.
    pub fn next_wait(&self) -> Option<Duration> {
        self.next_wait
    }

    /// Record a failure of the current attempt.
    pub fn on_failure(&mut self, transient: bool) -> Verdict {
        if !transient || self.attempt >= self.policy.max_attempts {
            self.next_wait = None;
            return Verdict::GiveUp;
        }
        let wait = self.policy.wait_after(self.attempt);
        self.next_wait = Some(wait);
        Verdict::Retry(wait)
    }
}
