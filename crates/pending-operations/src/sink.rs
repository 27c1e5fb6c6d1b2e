//! Error sink for failures that cannot be propagated synchronously.
//!
//! Operation-body failures, caught panics, backoff exhaustion and
//! internal-consistency violations all surface here, never through
//! [`run`](crate::PendingOperations::run)'s return value. The sink is
//! injected at construction so tests can capture reports instead of relying
//! on process-wide logging state.

use tracing::error;

/// Log-and-continue reporter for asynchronous failures.
pub trait ErrorSink: Send + Sync {
    /// Reports an error. Implementations must not panic or block.
    fn report(&self, error: &anyhow::Error);
}

/// Default sink: reports through `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, error: &anyhow::Error) {
        error!("{error:#}");
    }
}
