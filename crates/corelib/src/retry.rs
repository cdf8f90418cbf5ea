//! Bounded timeout-and-retry wrapper.
//!
//! Each attempt runs on its own thread and is abandoned, not cancelled,
//! once `timeout_ms` elapses: a late result is dropped and any side effects
//! of the abandoned attempt still happen. There is no deadline beyond the
//! sum of the per-attempt timeouts.

use crossbeam::channel::{self, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// How often and how long to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt.
    pub timeout_ms: u64,
    /// Total number of attempts, at least one.
    pub max_times: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            max_times: 3,
        }
    }
}

/// Why the last attempt did not produce a value.
#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Display> {
    /// The last attempt ran out of time.
    #[error("timed out after {attempts} attempts")]
    TimedOut { attempts: u32 },
    /// The last attempt returned an error.
    #[error("failed after {attempts} attempts: {last}")]
    Failed { attempts: u32, last: E },
    /// The last attempt could not run to completion (thread panic or spawn failure).
    #[error("attempt aborted after {attempts} attempts")]
    Aborted { attempts: u32 },
}

impl<E: fmt::Display> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::TimedOut { attempts }
            | RetryError::Failed { attempts, .. }
            | RetryError::Aborted { attempts } => *attempts,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_timeout: Duration, max_times: u32) -> Self {
        Self {
            timeout_ms: max_timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            max_times,
        }
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn attempts(&self) -> u32 {
        self.max_times.max(1)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    pub fn run<T, E, F>(&self, label: &str, op: F) -> Result<T, RetryError<E>>
    where
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let attempts = self.attempts();
        let mut last = RetryError::Aborted { attempts: 0 };

        for attempt in 1..=attempts {
            let (tx, rx) = channel::bounded(1);
            let job = Arc::clone(&op);
            let spawned = thread::Builder::new()
                .name(format!("retry-{label}"))
                .spawn(move || {
                    let _ = tx.send(job());
                });
            if let Err(e) = spawned {
                warn!(label, attempt, error = %e, "cannot start attempt");
                last = RetryError::Aborted { attempts: attempt };
                continue;
            }

            last = match rx.recv_timeout(self.max_timeout()) {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    debug!(label, attempt, error = %e, "attempt failed");
                    RetryError::Failed {
                        attempts: attempt,
                        last: e,
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    debug!(label, attempt, timeout_ms = self.timeout_ms, "attempt timed out");
                    RetryError::TimedOut { attempts: attempt }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(label, attempt, "attempt panicked");
                    RetryError::Aborted { attempts: attempt }
                }
            };
            if attempt < attempts {
                debug!(label, attempt, "retrying");
            }
        }
        Err(last)
    }
}
