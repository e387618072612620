//! Persisted representation of a domain event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::EventCodec;
use crate::error::OutboxError;
use crate::event::DomainEvent;

/// One stored domain event.
///
/// Immutable once written, except that `published_on` is set exactly once by
/// the publish protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Logical event type used to resolve a decoder.
    pub type_name: String,
    /// Identifier of the aggregate that raised the event.
    pub aggregate_root: String,
    /// Timestamp of event creation.
    pub occurred_on: DateTime<Utc>,
    /// Serialized payload, opaque to the store.
    pub event_body: String,
    /// `None` until the event has been dispatched.
    pub published_on: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// Encodes a domain event into a new, unpublished record.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Serialization` if the codec cannot encode the
    /// event.
    pub fn from_event<E>(event: &E, codec: &dyn EventCodec<E>) -> Result<Self, OutboxError>
    where
        E: DomainEvent,
    {
        let encoded = codec.encode(event)?;
        let meta = event.metadata();
        Ok(Self {
            event_id: meta.event_id,
            type_name: encoded.type_name,
            aggregate_root: meta.aggregate_root.clone(),
            occurred_on: meta.occurred_on,
            event_body: encoded.body,
            published_on: None,
        })
    }

    /// Whether the event has already been published.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.published_on.is_some()
    }

    /// The key two records must share for one to replace the other.
    #[must_use]
    pub fn replacement_key(&self) -> (&str, &str) {
        (&self.aggregate_root, &self.type_name)
    }

    /// The keyset position of this record in the unpublished listing.
    #[must_use]
    pub fn cursor(&self) -> PageCursor {
        PageCursor {
            occurred_on: self.occurred_on,
            event_id: self.event_id,
        }
    }
}

/// Position in the `(occurred_on, event_id)` ordering of unpublished events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageCursor {
    /// Creation time of the last record seen.
    pub occurred_on: DateTime<Utc>,
    /// Identifier of the last record seen, breaking timestamp ties.
    pub event_id: Uuid,
}
