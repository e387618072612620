//! Serialization boundary between domain events and stored records.

use std::collections::BTreeSet;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::OutboxError;
use crate::event::DomainEvent;

/// An event encoded for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEvent {
    /// Logical type name stored next to the body.
    pub type_name: String,
    /// Serialized payload.
    pub body: String,
}

/// Answers whether a stored type name maps to a known event schema.
pub trait EventTypeResolver: Send + Sync {
    /// Returns `true` if `type_name` can be decoded.
    fn resolves(&self, type_name: &str) -> bool;
}

/// Encodes events into `(type_name, body)` pairs and back.
pub trait EventCodec<E>: EventTypeResolver {
    /// Encodes an event for storage.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Serialization` if the payload cannot be encoded.
    fn encode(&self, event: &E) -> Result<EncodedEvent, OutboxError>;

    /// Decodes a stored body according to its type name.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::UnresolvableEventType` for unknown type names and
    /// `OutboxError::Serialization` for malformed bodies.
    fn decode(&self, type_name: &str, body: &str) -> Result<E, OutboxError>;
}

/// JSON codec for any serde-enabled event type.
pub struct JsonEventCodec<E> {
    _event: PhantomData<fn() -> E>,
}

impl<E> JsonEventCodec<E> {
    /// Creates a new JSON codec.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _event: PhantomData,
        }
    }
}

impl<E> Default for JsonEventCodec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for JsonEventCodec<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonEventCodec").finish()
    }
}

impl<E: DomainEvent> EventTypeResolver for JsonEventCodec<E> {
    fn resolves(&self, type_name: &str) -> bool {
        E::event_types().contains(&type_name)
    }
}

impl<E> EventCodec<E> for JsonEventCodec<E>
where
    E: DomainEvent + Serialize + DeserializeOwned,
{
    fn encode(&self, event: &E) -> Result<EncodedEvent, OutboxError> {
        let body = serde_json::to_string(event)
            .map_err(|e| OutboxError::Serialization(format!("event encoding failed: {e}")))?;
        Ok(EncodedEvent {
            type_name: event.event_type().to_owned(),
            body,
        })
    }

    fn decode(&self, type_name: &str, body: &str) -> Result<E, OutboxError> {
        if !self.resolves(type_name) {
            return Err(OutboxError::UnresolvableEventType(type_name.to_owned()));
        }
        serde_json::from_str(body)
            .map_err(|e| OutboxError::Serialization(format!("event decoding failed: {e}")))
    }
}

/// A fixed set of known type names, for tooling that inspects stored events
/// without linking the event types themselves.
#[derive(Debug, Clone, Default)]
pub struct KnownEventTypes(BTreeSet<String>);

impl<S: Into<String>> FromIterator<S> for KnownEventTypes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl EventTypeResolver for KnownEventTypes {
    fn resolves(&self, type_name: &str) -> bool {
        self.0.contains(type_name)
    }
}
