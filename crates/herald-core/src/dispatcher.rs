//! In-process delivery of published events.

use async_trait::async_trait;

use crate::error::OutboxError;

/// Delivers a decoded event to its in-process subscribers.
#[async_trait]
pub trait DomainEventDispatcher<E: Send + 'static>: Send + Sync {
    /// Dispatches one event. A subscriber failure is returned as
    /// `OutboxError::Dispatch` and leaves the event unpublished.
    async fn dispatch(&self, event: E) -> Result<(), OutboxError>;
}
