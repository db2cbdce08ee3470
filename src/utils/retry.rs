//! Bounded retry for container engine calls
//!
//! Only failures that look like the engine being briefly unreachable are
//! retried. A missing image or container fails on the first attempt.

use std::time::Duration;
use tracing::warn;

/// Result of a single attempt that did not succeed
#[derive(Debug, Clone)]
pub enum Attempt {
    Transient(String),
    Fatal(String),
}

impl Attempt {
    /// Classify an engine failure by its stderr
    pub fn from_stderr(message: String) -> Self {
        if is_transient(&message) {
            Attempt::Transient(message)
        } else {
            Attempt::Fatal(message)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out
    pub fn run<T>(
        &self,
        step: &str,
        mut op: impl FnMut() -> Result<T, Attempt>,
    ) -> Result<T, String> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(Attempt::Fatal(reason)) => return Err(reason),
                Err(Attempt::Transient(reason)) if attempt >= attempts => {
                    return Err(format!("{} (gave up after {} attempts)", reason, attempts))
                }
                Err(Attempt::Transient(reason)) => {
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        step, attempt, attempts, self.delay, reason
                    );
                    std::thread::sleep(self.delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Whether an engine error message describes a condition worth retrying
pub fn is_transient(message: &str) -> bool {
    const MARKERS: &[&str] = &[
        "cannot connect to the docker daemon",
        "is the docker daemon running",
        "connection refused",
        "connection reset",
        "timed out",
        "timeout",
        "deadline exceeded",
        "temporarily unavailable",
        "try again",
        "tls handshake",
    ];

    let message = message.to_lowercase();
    MARKERS.iter().any(|marker| message.contains(marker))
}
