//! Pending-operations tracking for volume managers.
//!
//! This crate provides a concurrency gate for mutating volume operations:
//! at most one operation per `(volume, pod)` key is in flight at a time,
//! operations on the same volume but different pods run in parallel, and
//! failed operations enter an exponential-backoff cool-down that suppresses
//! same-kind retries until the window elapses.
//!
//! # Usage
//!
//! ```no_run
//! use pending_operations::{GeneratedOperation, OperationOutcome, PendingOperations};
//!
//! # async fn example() -> Result<(), pending_operations::PendingOperationError> {
//! let tracker = PendingOperations::new(true);
//!
//! tracker
//!     .run(
//!         "volume-1".into(),
//!         "pod-a".into(),
//!         GeneratedOperation::new("attach_volume", async {
//!             // ... attach the volume ...
//!             OperationOutcome::ok()
//!         }),
//!     )
//!     .await?;
//!
//! // A second attach for the same key is refused while the first runs.
//! assert!(tracker.is_operation_pending("volume-1".into(), "pod-a".into()).await);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`PendingOperations`] owns the record set and makes admission decisions
//!   under a short write-lock section; operation bodies execute as spawned
//!   tasks, never under the lock.
//! - [`ExponentialBackoff`] is the per-record retry cool-down collaborator.
//! - [`ErrorSink`] receives failures that cannot be propagated synchronously
//!   (operation-body errors, caught panics, exhaustion messages); the
//!   default [`LogErrorSink`] reports through `tracing`.
//!
//! `run` only ever returns admission errors ([`PendingOperationError`]);
//! the spawned operation's outcome is observable through
//! [`PendingOperations::is_operation_pending`], the sink and the operation's
//! own side effects.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backoff;
pub mod error;
pub mod sink;
pub mod tracker;
pub mod types;

pub use backoff::{ExponentialBackoff, ExponentialBackoffError};
pub use error::PendingOperationError;
pub use sink::{ErrorSink, LogErrorSink};
pub use tracker::PendingOperations;
pub use types::{
    GeneratedOperation, OperationKey, OperationOutcome, UniquePodName, UniqueVolumeName,
};
