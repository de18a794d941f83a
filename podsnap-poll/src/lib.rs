//! Bounded poll loops for Podsnap lifecycle waits
//!
//! This crate provides the single blocking wait used across Podsnap: re-check
//! a condition at a fixed cadence until it reports completion or a deadline
//! elapses. Time is read through a [`Clock`] so tests can drive virtual time
//! without real delays.

use backoff::backoff::{Backoff, Constant};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors produced by a poll loop
#[derive(Error, Debug)]
pub enum PollError<E> {
    #[error("Operation '{operation}' did not complete within {deadline:?} ({attempts} checks)")]
    DeadlineExceeded {
        operation: &'static str,
        deadline: Duration,
        attempts: usize,
    },
    #[error("Operation '{operation}' failed on check {attempt}: {error}")]
    Check {
        operation: &'static str,
        attempt: usize,
        error: E,
    },
}

/// Result of a single check inside a poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// The awaited condition holds; stop polling and return the value
    Done(T),
    /// Not there yet; sleep one interval and check again
    Pending,
}

/// Source of time for poll loops
pub trait Clock {
    /// Current instant
    fn now(&self) -> Instant;

    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::time` and `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock: `sleep` advances time instantly
///
/// Useful in tests that need to simulate long waits.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move virtual time forward without sleeping
    pub fn advance(&self, duration: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += duration;
    }

    /// Total virtual time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Shortest wait between checks
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Cadence and deadline of a poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fixed wait between checks, never below [`MIN_INTERVAL`]
    pub interval: Duration,
    /// Total time budget measured from the first check
    pub deadline: Duration,
}

impl PollPolicy {
    /// A zero interval is raised to [`MIN_INTERVAL`]
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            deadline,
        }
    }
}

/// Re-run `check` until it reports [`PollStatus::Done`], fails, or the
/// policy deadline elapses.
///
/// The first check runs immediately. Sleeps never overshoot the deadline, and
/// one last check is made once it is reached. Errors from `check` end the
/// loop; they are never retried.
pub fn poll_until<C, T, E, F>(
    op_name: &'static str,
    clock: &C,
    policy: PollPolicy,
    mut check: F,
) -> Result<T, PollError<E>>
where
    C: Clock + ?Sized,
    F: FnMut(usize) -> Result<PollStatus<T>, E>,
{
    let start = clock.now();
    let step = policy.interval.max(MIN_INTERVAL);
    let mut cadence = Constant::new(step);
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(operation = op_name, attempt, "Polling");

        match check(attempt) {
            Ok(PollStatus::Done(value)) => {
                debug!(operation = op_name, attempt, "Poll completed");
                return Ok(value);
            }
            Ok(PollStatus::Pending) => {}
            Err(error) => {
                return Err(PollError::Check {
                    operation: op_name,
                    attempt,
                    error,
                });
            }
        }

        let elapsed = clock.now().saturating_duration_since(start);
        if elapsed >= policy.deadline {
            warn!(
                operation = op_name,
                attempts = attempt,
                deadline = ?policy.deadline,
                "Poll deadline exceeded"
            );
            return Err(PollError::DeadlineExceeded {
                operation: op_name,
                deadline: policy.deadline,
                attempts: attempt,
            });
        }

        let interval = cadence.next_backoff().unwrap_or(step);
        clock.sleep(interval.min(policy.deadline - elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(interval_secs: u64, deadline_secs: u64) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(interval_secs),
            Duration::from_secs(deadline_secs),
        )
    }

    #[test]
    fn test_zero_interval_is_raised_and_terminates() {
        assert_eq!(
            PollPolicy::new(Duration::ZERO, Duration::from_secs(1)).interval,
            MIN_INTERVAL
        );

        // fields are public, so the loop guards against zero on its own
        let raw = PollPolicy {
            interval: Duration::ZERO,
            deadline: Duration::from_millis(10),
        };
        let clock = ManualClock::new();
        let result: Result<(), PollError<String>> =
            poll_until("op", &clock, raw, |_| Ok(PollStatus::Pending));

        match result {
            Err(PollError::DeadlineExceeded { attempts, .. }) => assert_eq!(attempts, 11),
            other => panic!("expected deadline exceeded, got {other:?}"),
        }
        assert_eq!(clock.elapsed(), Duration::from_millis(10));
    }

    #[test]
    fn test_done_on_first_check_does_not_sleep() {
        let clock = ManualClock::new();
        let result: Result<&str, PollError<String>> =
            poll_until("op", &clock, policy(1, 10), |_| Ok(PollStatus::Done("ok")));

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_pending_then_done_sleeps_fixed_interval() {
        let clock = ManualClock::new();
        let result: Result<usize, PollError<String>> =
            poll_until("op", &clock, policy(2, 60), |attempt| {
                if attempt < 4 {
                    Ok(PollStatus::Pending)
                } else {
                    Ok(PollStatus::Done(attempt))
                }
            });

        assert_eq!(result.unwrap(), 4);
        assert_eq!(clock.elapsed(), Duration::from_secs(6));
    }

    #[test]
    fn test_deadline_exceeded() {
        let clock = ManualClock::new();
        let result: Result<(), PollError<String>> =
            poll_until("op", &clock, policy(3, 10), |_| Ok(PollStatus::Pending));

        match result {
            Err(PollError::DeadlineExceeded {
                operation,
                attempts,
                ..
            }) => {
                assert_eq!(operation, "op");
                // checks at t = 0, 3, 6, 9, 10
                assert_eq!(attempts, 5);
            }
            other => panic!("expected deadline error, got {other:?}"),
        }
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_deadline_checks_once() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let result: Result<(), PollError<String>> =
            poll_until("op", &clock, policy(1, 0), |_| {
                calls += 1;
                Ok(PollStatus::Pending)
            });

        assert!(matches!(result, Err(PollError::DeadlineExceeded { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_check_error_stops_without_retry() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let result: Result<(), PollError<String>> =
            poll_until("op", &clock, policy(1, 10), |_| {
                calls += 1;
                Err("boom".to_string())
            });

        match result {
            Err(PollError::Check { attempt, error, .. }) => {
                assert_eq!(attempt, 1);
                assert_eq!(error, "boom");
            }
            other => panic!("expected check error, got {other:?}"),
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new();
        let before = clock.now();
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - before, Duration::from_millis(250));
    }
}
