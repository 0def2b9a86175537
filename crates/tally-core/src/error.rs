//! Error types for the reactive core.

use thiserror::Error;

use crate::MutationKind;

/// Errors surfaced to callers that wait on the service.
///
/// Fire-and-forget operations never return these; they report failures as
/// [`ServiceEvent`](crate::ServiceEvent)s instead.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The service has been shut down.
    #[error("item service is shut down")]
    Closed,

    /// The store rejected a mutation.
    #[error("{kind} failed: {message}")]
    Mutation { kind: MutationKind, message: String },

    /// The refetch following a mutation failed.
    #[error("refetch #{seq} failed: {message}")]
    Fetch { seq: u64, message: String },
}
