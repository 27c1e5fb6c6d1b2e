//! Exponential backoff state for failed operations.
//!
//! Each tracked operation owns one [`ExponentialBackoff`]. After a failure
//! the tracker calls [`ExponentialBackoff::update`], which records the error
//! and doubles the cool-down window; admission calls
//! [`ExponentialBackoff::safe_to_retry`] to decide whether a same-kind retry
//! is allowed yet.

use std::time::{Duration, Instant};

use thiserror::Error;

/// Cool-down after the first failure.
const INITIAL_DURATION_BEFORE_RETRY: Duration = Duration::from_millis(500);

/// Upper bound on the cool-down window.
const MAX_DURATION_BEFORE_RETRY: Duration = Duration::from_secs(2 * 60 + 2);

/// Retry attempted before the backoff window for its key elapsed.
#[derive(Debug, Clone, Error)]
#[error(
    "operation for {key} failed, no retries permitted for {duration_before_retry:?} \
     after the last failure, last error: {last_error}"
)]
pub struct ExponentialBackoffError {
    /// Rendered operation key the window applies to.
    pub key: String,
    /// Current cool-down window.
    pub duration_before_retry: Duration,
    /// The error recorded by the most recent failure.
    pub last_error: String,
}

/// Per-key exponential backoff state.
///
/// A fresh (default) value permits retry immediately; the window only starts
/// once `update` records a failure.
#[derive(Debug, Default)]
pub struct ExponentialBackoff {
    last_error: Option<String>,
    last_error_time: Option<Instant>,
    duration_before_retry: Duration,
}

impl ExponentialBackoff {
    /// Checks whether the cool-down window for `key` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`ExponentialBackoffError`] while the most recent failure is
    /// still inside its cool-down window.
    pub fn safe_to_retry(&self, key: &str) -> Result<(), ExponentialBackoffError> {
        match self.last_error_time {
            Some(last) if last.elapsed() <= self.duration_before_retry => {
                Err(ExponentialBackoffError {
                    key: key.to_string(),
                    duration_before_retry: self.duration_before_retry,
                    last_error: self.last_error.clone().unwrap_or_default(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Records a failure: doubles the cool-down window (capped) and stamps
    /// the error and failure time.
    pub fn update(&mut self, error: &anyhow::Error) {
        self.duration_before_retry = if self.duration_before_retry.is_zero() {
            INITIAL_DURATION_BEFORE_RETRY
        } else {
            (self.duration_before_retry * 2).min(MAX_DURATION_BEFORE_RETRY)
        };
        self.last_error = Some(format!("{error:#}"));
        self.last_error_time = Some(Instant::now());
    }

    /// Renders the message logged when an operation fails and enters
    /// cool-down.
    #[must_use]
    pub fn no_retries_permitted_message(&self, key: &str) -> String {
        format!(
            "operation for {key} failed, no retries permitted for {:?}, error: {}",
            self.duration_before_retry,
            self.last_error.as_deref().unwrap_or("<none>")
        )
    }
}
