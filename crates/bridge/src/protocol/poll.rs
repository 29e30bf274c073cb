//! Bounded polling.
//!
//! Every status wait in the driver goes through [`poll_until`]. Running out of
//! attempts is reported as [`PollOutcome::Exhausted`], not as an error, so the
//! caller decides whether "not ready yet" is a timeout, a size mismatch, or a
//! device fault. Errors from the read itself (link failures) propagate.

use std::thread;
use std::time::{Duration, Instant};

use crate::common::error::Result;

/// Limits applied to one polling loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Sleep between consecutive attempts.
    pub delay: Duration,
    /// Wall-clock budget for the whole loop.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Creates a policy from its three limits.
    pub const fn new(max_attempts: u32, delay: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            timeout,
        }
    }

    /// A policy that polls back to back, for in-process peers.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(60),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(1000, Duration::from_micros(50), Duration::from_secs(2))
    }
}

/// Result of a polling loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The condition held after `attempts` reads.
    Ready {
        /// Value that satisfied the condition.
        value: T,
        /// Reads performed, including the successful one.
        attempts: u32,
    },
    /// The attempt or time budget ran out.
    Exhausted {
        /// Last value read.
        last: T,
        /// Reads performed.
        attempts: u32,
    },
}

impl<T: Copy> PollOutcome<T> {
    /// Returns `true` if the condition was met.
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Returns the last value read, whether or not it satisfied the condition.
    pub fn value(&self) -> T {
        match self {
            Self::Ready { value, .. } => *value,
            Self::Exhausted { last, .. } => *last,
        }
    }

    /// Returns the number of reads performed.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Ready { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Reads until `done` accepts the value read or the policy runs out.
///
/// At least one read is always made. The sleep happens between reads only,
/// never after the last one.
///
/// # Arguments
///
/// * `policy` - Attempt, delay, and time limits.
/// * `read` - Reads the current value; its errors abort the loop.
/// * `done` - Returns `true` when the value read ends the wait.
///
/// # Returns
///
/// `Ready` with the accepted value, or `Exhausted` with the last value read.
pub fn poll_until<T, F, P>(policy: &PollPolicy, mut read: F, mut done: P) -> Result<PollOutcome<T>>
where
    T: Copy,
    F: FnMut() -> Result<T>,
    P: FnMut(&T) -> bool,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        let value = read()?;
        attempts += 1;
        if done(&value) {
            return Ok(PollOutcome::Ready { value, attempts });
        }
        if attempts >= max_attempts || started.elapsed() >= policy.timeout {
            return Ok(PollOutcome::Exhausted {
                last: value,
                attempts,
            });
        }
        if !policy.delay.is_zero() {
            thread::sleep(policy.delay);
        }
    }
}
