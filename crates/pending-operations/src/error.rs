//! Admission errors returned by [`PendingOperations::run`].
//!
//! Both variants mean "try again later", not hard failure: the caller is
//! expected to re-run the operation on its next sync.
//!
//! [`PendingOperations::run`]: crate::PendingOperations::run

use thiserror::Error;

use crate::backoff::ExponentialBackoffError;
use crate::types::OperationKey;

/// Reasons an operation can be refused admission.
#[derive(Debug, Error)]
pub enum PendingOperationError {
    /// An operation with a matching key is currently executing.
    #[error("failed to start operation for {key}, an operation with that key is already executing")]
    AlreadyExists {
        /// The requested key. It may differ from the conflicting record's
        /// key when the conflict came through wildcard matching.
        key: OperationKey,
    },

    /// A same-kind retry arrived before its backoff window elapsed.
    #[error(transparent)]
    ExponentialBackoff(#[from] ExponentialBackoffError),
}

impl PendingOperationError {
    /// True if the error is an admission conflict with an executing
    /// operation.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// True if the error is a backoff-window suppression.
    #[must_use]
    pub fn is_exponential_backoff(&self) -> bool {
        matches!(self, Self::ExponentialBackoff(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_classify_variants() {
        let conflict = PendingOperationError::AlreadyExists {
            key: OperationKey::new("vol".into(), "pod".into()),
        };
        assert!(conflict.is_already_exists());
        assert!(!conflict.is_exponential_backoff());

        let backoff = PendingOperationError::ExponentialBackoff(ExponentialBackoffError {
            key: "\"vol\" (\"pod\")".to_string(),
            duration_before_retry: std::time::Duration::from_millis(500),
            last_error: "attach failed".to_string(),
        });
        assert!(backoff.is_exponential_backoff());
        assert!(!backoff.is_already_exists());
    }
}
