//! Key and operation types for the pending-operations tracker.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

/// Unique name of a volume, as assigned by the volume manager.
///
/// The empty name is a sentinel: operations keyed by it are never tracked and
/// never conflict with anything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UniqueVolumeName(String);

impl UniqueVolumeName {
    /// The empty (unscoped) volume name.
    #[must_use]
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Returns true if this is the empty sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UniqueVolumeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for UniqueVolumeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for UniqueVolumeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique name of a pod, scoped within a volume operation key.
///
/// The empty name is a wildcard: it matches any pod name on the same volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct UniquePodName(String);

impl UniquePodName {
    /// The empty (wildcard) pod name.
    #[must_use]
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Returns true if this is the wildcard sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UniquePodName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for UniquePodName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for UniquePodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Composite key addressing one tracked operation: a volume plus, optionally,
/// the pod the operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    volume_name: UniqueVolumeName,
    pod_name: UniquePodName,
}

impl OperationKey {
    #[must_use]
    pub fn new(volume_name: UniqueVolumeName, pod_name: UniquePodName) -> Self {
        Self {
            volume_name,
            pod_name,
        }
    }

    #[must_use]
    pub fn volume_name(&self) -> &UniqueVolumeName {
        &self.volume_name
    }

    #[must_use]
    pub fn pod_name(&self) -> &UniquePodName {
        &self.pod_name
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:?})", self.volume_name.0, self.pod_name.0)
    }
}

/// Result pair produced by an operation body.
///
/// `event_error` is the user-facing error an operation generator may want to
/// record as an event; the tracker itself ignores it. `detailed_error` is
/// what drives completion bookkeeping: `None` means success, `Some` feeds
/// backoff state and the error sink.
#[derive(Debug, Default)]
pub struct OperationOutcome {
    /// User-facing error, for the operation generator's own event recording.
    pub event_error: Option<anyhow::Error>,
    /// Detailed error consumed by the tracker's completion bookkeeping.
    pub detailed_error: Option<anyhow::Error>,
}

impl OperationOutcome {
    /// Successful completion.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// Failed completion where the same error serves as both the event and
    /// the detailed error.
    #[must_use]
    pub fn failure(error: anyhow::Error) -> Self {
        Self {
            event_error: Some(anyhow::anyhow!("{error:#}")),
            detailed_error: Some(error),
        }
    }
}

/// A unit of work plus the name used to classify retries of it.
///
/// Two requests with matching keys and the same `operation_name` are treated
/// as the same operation retrying (subject to backoff); a different name is a
/// genuinely different operation and resets backoff for the key.
pub struct GeneratedOperation {
    /// Kind tag, e.g. `"attach_volume"` or `"verify_volumes_are_attached"`.
    pub operation_name: String,
    /// The operation body, spawned onto the runtime when admitted.
    pub operation: BoxFuture<'static, OperationOutcome>,
}

impl GeneratedOperation {
    #[must_use = "a generated operation does nothing until handed to the tracker"]
    pub fn new<F>(operation_name: impl Into<String>, operation: F) -> Self
    where
        F: Future<Output = OperationOutcome> + Send + 'static,
    {
        Self {
            operation_name: operation_name.into(),
            operation: operation.boxed(),
        }
    }
}

impl fmt::Debug for GeneratedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedOperation")
            .field("operation_name", &self.operation_name)
            .finish_non_exhaustive()
    }
}
