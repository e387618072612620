//! Outbox error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for every outbox operation.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// The underlying partition rejected a read or write.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A stored event record no longer exists.
    #[error("event record not found: {0}")]
    RecordNotFound(Uuid),

    /// A record was already published; `published_on` is set only once.
    #[error("event record already published: {0}")]
    AlreadyPublished(Uuid),

    /// An event could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored type name does not resolve to a known event type.
    #[error("unresolvable event type: {0}")]
    UnresolvableEventType(String),

    /// A subscriber failed while handling a dispatched event.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// The lock provider failed (contention is not an error).
    #[error("lock error: {0}")]
    Lock(String),

    /// Invalid configuration, detected at the point of use.
    #[error("configuration error: {0}")]
    Configuration(String),
}
