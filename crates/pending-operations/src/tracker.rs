//! The pending-operations tracker.
//!
//! Serializes mutating operations addressed by a `(volume, pod)` key pair:
//! at most one operation per matching key is in flight at a time, while
//! operations on the same volume but different pods proceed in parallel.
//! Failed operations leave exponential-backoff state behind so same-kind
//! retries are suppressed until their cool-down window elapses.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::anyhow;
use futures::FutureExt;
use tokio::sync::{Notify, RwLock};

use crate::backoff::ExponentialBackoff;
use crate::error::PendingOperationError;
use crate::sink::{ErrorSink, LogErrorSink};
use crate::types::{GeneratedOperation, OperationKey, UniquePodName, UniqueVolumeName};

/// Tracks in-flight and cooling-down operations per `(volume, pod)` key.
///
/// Cheaply cloneable handle; clones share the same record set. Admission
/// decisions happen under a short write-lock section, never across the
/// operation body's execution.
#[derive(Clone)]
pub struct PendingOperations {
    inner: Arc<Inner>,
}

struct Inner {
    /// Tracked records. A pending record blocks matching admissions; a
    /// non-pending record is a failed operation in backoff cool-down.
    operations: RwLock<HashMap<OperationKey, TrackedOperation>>,
    /// Whether failed operations leave backoff state behind instead of being
    /// removed outright.
    exponential_backoff_on_error: bool,
    /// Signaled after every completion so `wait` can re-check emptiness.
    drained: Notify,
    /// Reporter for failures that cannot be propagated synchronously.
    sink: Arc<dyn ErrorSink>,
}

#[derive(Debug)]
struct TrackedOperation {
    operation_name: String,
    pending: bool,
    backoff: ExponentialBackoff,
}

impl TrackedOperation {
    fn new(operation_name: &str) -> Self {
        Self {
            operation_name: operation_name.to_string(),
            pending: true,
            backoff: ExponentialBackoff::default(),
        }
    }
}

impl PendingOperations {
    /// Creates a tracker reporting through the default `tracing` sink.
    #[must_use]
    pub fn new(exponential_backoff_on_error: bool) -> Self {
        Self::with_error_sink(exponential_backoff_on_error, Arc::new(LogErrorSink))
    }

    /// Creates a tracker with an injected error sink.
    #[must_use]
    pub fn with_error_sink(exponential_backoff_on_error: bool, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                operations: RwLock::new(HashMap::new()),
                exponential_backoff_on_error,
                drained: Notify::new(),
                sink,
            }),
        }
    }

    /// Admits and spawns `generated` for the `(volume_name, pod_name)` key.
    ///
    /// Returns as soon as the operation body is spawned; its eventual
    /// success or failure is observable only through
    /// [`is_operation_pending`](Self::is_operation_pending), the error sink
    /// and the operation's own side effects.
    ///
    /// An empty `volume_name` admits unconditionally and leaves no record
    /// behind. An empty `pod_name` registers a wildcard that conflicts with
    /// every pod on the same volume. A request whose `operation_name`
    /// differs from a cooling-down record's resets that record's backoff and
    /// is admitted immediately.
    ///
    /// # Errors
    ///
    /// - [`PendingOperationError::AlreadyExists`] if a matching operation is
    ///   currently executing.
    /// - [`PendingOperationError::ExponentialBackoff`] if a same-kind retry
    ///   arrived before its backoff window elapsed.
    pub async fn run(
        &self,
        volume_name: UniqueVolumeName,
        pod_name: UniquePodName,
        generated: GeneratedOperation,
    ) -> Result<(), PendingOperationError> {
        let op_key = OperationKey::new(volume_name, pod_name);

        {
            let mut operations = self.inner.operations.write().await;

            if let Some((existing_key, mut existing)) = Self::take_match(&mut operations, &op_key) {
                if existing.pending {
                    operations.insert(existing_key, existing);
                    return Err(PendingOperationError::AlreadyExists { key: op_key });
                }

                if let Err(backoff_err) = existing.backoff.safe_to_retry(&existing_key.to_string())
                {
                    if existing.operation_name == generated.operation_name {
                        operations.insert(existing_key, existing);
                        return Err(backoff_err.into());
                    }
                    // A different kind of operation on a cooling-down key:
                    // the previous failure's backoff no longer applies.
                    existing.operation_name.clone_from(&generated.operation_name);
                    existing.backoff = ExponentialBackoff::default();
                }

                existing.pending = true;
                // Re-register under the requested key; a wildcard record can
                // be re-admitted with a concrete pod name, or vice versa.
                operations.insert(op_key.clone(), existing);
            } else if !op_key.volume_name().is_empty() {
                operations.insert(
                    op_key.clone(),
                    TrackedOperation::new(&generated.operation_name),
                );
            }
            // Empty volume name: admitted but never tracked.
        }

        self.spawn_operation(op_key, generated);
        Ok(())
    }

    /// True iff a record matching `(volume_name, pod_name)` exists and its
    /// operation is still executing.
    pub async fn is_operation_pending(
        &self,
        volume_name: UniqueVolumeName,
        pod_name: UniquePodName,
    ) -> bool {
        let op_key = OperationKey::new(volume_name, pod_name);
        let operations = self.inner.operations.read().await;

        Self::match_key(&operations, &op_key)
            .and_then(|matched| operations.get(&matched))
            .is_some_and(|existing| existing.pending)
    }

    /// Blocks until the record set is empty.
    ///
    /// Pending and cooling-down records both count; primarily useful for
    /// deterministic test synchronization.
    pub async fn wait(&self) {
        loop {
            let drained = self.inner.drained.notified();
            tokio::pin!(drained);
            // Register for wakeups before checking, so a completion between
            // the check and the await is not lost.
            drained.as_mut().enable();

            if self.inner.operations.read().await.is_empty() {
                return;
            }
            drained.await;
        }
    }

    fn spawn_operation(&self, op_key: OperationKey, generated: GeneratedOperation) {
        let inner = Arc::clone(&self.inner);
        let GeneratedOperation {
            operation_name,
            operation,
        } = generated;

        tokio::spawn(async move {
            let error = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(outcome) => outcome.detailed_error,
                Err(payload) => Some(anyhow!(
                    "operation {operation_name} for {op_key} panicked: {}",
                    panic_message(payload.as_ref())
                )),
            };
            inner.operation_complete(&op_key, error).await;
        });
    }

    /// Finds the tracked key, if any, that `key` matches: exact entry first,
    /// then the volume's wildcard entry; a wildcard request falls back to a
    /// scan over the volume's entries.
    fn match_key(
        operations: &HashMap<OperationKey, TrackedOperation>,
        key: &OperationKey,
    ) -> Option<OperationKey> {
        if key.volume_name().is_empty() {
            return None;
        }
        if operations.contains_key(key) {
            return Some(key.clone());
        }
        if key.pod_name().is_empty() {
            return operations
                .keys()
                .find(|existing| existing.volume_name() == key.volume_name())
                .cloned();
        }
        let wildcard = OperationKey::new(key.volume_name().clone(), UniquePodName::empty());
        if operations.contains_key(&wildcard) {
            Some(wildcard)
        } else {
            None
        }
    }

    fn take_match(
        operations: &mut HashMap<OperationKey, TrackedOperation>,
        key: &OperationKey,
    ) -> Option<(OperationKey, TrackedOperation)> {
        let matched = Self::match_key(operations, key)?;
        let existing = operations.remove(&matched)?;
        Some((matched, existing))
    }
}

impl Inner {
    async fn operation_complete(&self, op_key: &OperationKey, error: Option<anyhow::Error>) {
        {
            let mut operations = self.operations.write().await;

            if error.is_none()
                || !self.exponential_backoff_on_error
                || op_key.volume_name().is_empty()
            {
                // Success, backoff disabled, or an unscoped key (which never
                // had a record): remove any record and surface the error,
                // leaving the key immediately admissible again.
                operations.remove(op_key);
                if let Some(error) = error {
                    self.sink
                        .report(&error.context(format!("operation for {op_key} failed")));
                }
            } else if let Some(error) = &error {
                match operations.get_mut(op_key) {
                    Some(existing) => {
                        existing.backoff.update(error);
                        existing.pending = false;
                        self.sink.report(&anyhow!(existing
                            .backoff
                            .no_retries_permitted_message(&op_key.to_string())));
                    }
                    None => {
                        // Admission always leaves a record behind for
                        // tracked keys, so this indicates lost bookkeeping.
                        self.sink.report(&anyhow!(
                            "operation for {op_key} completed with error ({error:#}) \
                             but its tracked record is missing"
                        ));
                    }
                }
            }
        }

        self.drained.notify_waiters();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
