//! Retry policy for transient failures
//!
//! Hashing a file that another process holds open and downloading over a
//! flaky link both fail in ways that resolve themselves. [`RetryPolicy`] is the
//! single knob for how long to keep trying; the default is five retries with
//! a fixed 500 ms pause.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How long to wait before a given retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delay {
    /// Same pause before every retry.
    Fixed { millis: u64 },
    /// Doubling pause starting at `initial_millis`, capped at `max_millis`.
    Exponential { initial_millis: u64, max_millis: u64 },
}

impl Delay {
    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed {
            millis: delay.as_millis() as u64,
        }
    }

    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self::Exponential {
            initial_millis: initial.as_millis() as u64,
            max_millis: max.as_millis() as u64,
        }
    }
}

/// Bounded retry policy: `max_retries` retries after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Delay,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Delay::Fixed { millis: 500 },
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Delay::Fixed { millis: 0 },
        }
    }

    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay: Delay::fixed(delay),
        }
    }

    /// Total number of attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Pause before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.delay {
            Delay::Fixed { millis } => Duration::from_millis(millis),
            Delay::Exponential {
                initial_millis,
                max_millis,
            } => {
                let shift = retry.saturating_sub(1).min(20);
                let millis = initial_millis.saturating_mul(1u64 << shift);
                Duration::from_millis(millis.min(max_millis))
            }
        }
    }

    /// A [`backoff::backoff::Backoff`] that yields this policy's delays and
    /// stops after `max_retries`.
    pub fn backoff(&self) -> PolicyBackoff {
        PolicyBackoff {
            policy: *self,
            retries: 0,
        }
    }

    /// Run a blocking operation, retrying while it fails transiently.
    ///
    /// Permanent errors are returned immediately. When the retries run out,
    /// an I/O failure is reported as [`Error::RetriesExhausted`] for `path`.
    pub fn retry_blocking<T>(&self, path: &Path, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.max_attempts();
        let outcome = backoff::retry_notify(
            self.backoff(),
            || {
                op().map_err(|e| {
                    if e.is_transient() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            },
            |err: Error, wait: Duration| {
                tracing::warn!(
                    path = %path.display(),
                    wait_ms = wait.as_millis() as u64,
                    "Transient failure, retrying: {}",
                    err
                );
            },
        );

        match outcome {
            Ok(value) => Ok(value),
            Err(backoff::Error::Permanent(err)) => Err(err),
            Err(backoff::Error::Transient { err, .. }) => Err(match err {
                Error::Io { path, source } => Error::RetriesExhausted {
                    path,
                    attempts,
                    source,
                },
                other => other,
            }),
        }
    }
}

/// Backoff adapter over a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct PolicyBackoff {
    policy: RetryPolicy,
    retries: u32,
}

impl backoff::backoff::Backoff for PolicyBackoff {
    fn reset(&mut self) {
        self.retries = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }
        self.retries += 1;
        Some(self.policy.delay_for(self.retries))
    }
}
