//! Distributed lock abstraction used by the publish protocol.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::OutboxError;

/// Prefix of every publication lock name.
pub const LOCK_NAME_PREFIX: &str = "domain-event-";

/// Name of the lock guarding publication of one event.
///
/// Event identifiers are globally unique, so the name is unique across every
/// partition sharing a lock provider.
#[must_use]
pub fn lock_name(event_id: Uuid) -> String {
    format!("{LOCK_NAME_PREFIX}{event_id}")
}

/// A named, non-blocking lock shared between processes.
///
/// Providers must expire locks held by crashed processes (a TTL or a session
/// bound lock) so that abandoned events are retried on a later pass.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Tries once to take the lock. Returns `false` if the lock is held,
    /// whether elsewhere or by this same provider. Locks are not reentrant.
    async fn acquire(&self, name: &str) -> Result<bool, OutboxError>;

    /// Releases a lock taken with [`LockProvider::acquire`].
    async fn release(&self, name: &str) -> Result<(), OutboxError>;
}
