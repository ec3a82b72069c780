//! # Reconnect policy
//!
//! Collaborators may not be running yet when the executable starts. Rather than failing, clients
//! poll for reachability at a fixed interval until the collaborator appears or the executable is
//! stopped.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest single sleep while waiting, so a stop request is seen promptly.
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(50);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// How to wait for a collaborator to become reachable.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Time between two reachability checks
    pub interval: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RetryError {
    #[error("Stopped while waiting for {0} after {1} attempts")]
    Stopped(String, u64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RetryPolicy {
    /// Check at a fixed interval.
    pub fn fixed(interval: Duration) -> Self {
        Self { interval }
    }

    /// Block until `is_reachable` returns true, checking once per interval.
    ///
    /// Every failed check logs a warning naming `what`. Returns the number of failed checks, or
    /// an error if `run` is cleared before the collaborator became reachable.
    pub fn wait_until<F>(&self, what: &str, run: &AtomicBool, mut is_reachable: F) -> Result<u64, RetryError>
    where
        F: FnMut() -> bool,
    {
        let mut attempts = 0;

        loop {
            if !run.load(Ordering::Relaxed) {
                return Err(RetryError::Stopped(what.into(), attempts));
            }

            if is_reachable() {
                return Ok(attempts);
            }

            attempts += 1;
            warn!("Waiting for {}...", what);

            sleep_unless_stopped(self.interval, run);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Sleep for `duration` in short slices, returning early if `run` is cleared.
pub fn sleep_unless_stopped(duration: Duration, run: &AtomicBool) {
    let end = Instant::now() + duration;

    while run.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= end {
            break;
        }

        thread::sleep((end - now).min(MAX_SLEEP_SLICE));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reachable_immediately() {
        let run = AtomicBool::new(true);
        let policy = RetryPolicy::fixed(Duration::from_secs(10));

        assert_eq!(policy.wait_until("server", &run, || true), Ok(0));
    }

    #[test]
    fn test_counts_failed_attempts() {
        let run = AtomicBool::new(true);
        let policy = RetryPolicy::fixed(Duration::from_millis(1));

        let mut checks = 0;
        let result = policy.wait_until("server", &run, || {
            checks += 1;
            checks > 3
        });

        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_stop_ends_wait() {
        let run = AtomicBool::new(true);
        let policy = RetryPolicy::fixed(Duration::from_millis(1));

        let mut checks = 0;
        let result = policy.wait_until("server", &run, || {
            checks += 1;
            if checks == 2 {
                run.store(false, Ordering::Relaxed);
            }
            false
        });

        assert_eq!(result, Err(RetryError::Stopped("server".into(), 2)));
    }

    #[test]
    fn test_sleep_returns_when_stopped() {
        let run = AtomicBool::new(false);
        let start = Instant::now();

        sleep_unless_stopped(Duration::from_secs(10), &run);

        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
