//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier, also used as the publication lock key.
    pub event_id: Uuid,
    /// Identifier of the aggregate that raised the event.
    pub aggregate_root: String,
    /// Timestamp of event creation.
    pub occurred_on: DateTime<Utc>,
}

impl EventMetadata {
    /// Creates metadata with a fresh time-ordered event identifier.
    #[must_use]
    pub fn new(aggregate_root: impl Into<String>, occurred_on: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_root: aggregate_root.into(),
            occurred_on,
        }
    }
}

/// Trait that all domain events implement.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Returns the event type name (stored alongside the body and used to
    /// route decoding).
    fn event_type(&self) -> &'static str;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;

    /// Every type name this event type can be decoded from.
    fn event_types() -> &'static [&'static str]
    where
        Self: Sized;
}
