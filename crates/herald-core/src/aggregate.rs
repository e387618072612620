//! Aggregates that record domain events for later persistence.

/// An event recorded on an aggregate but not yet written to an event store.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingEvent<E> {
    /// Appended as a new record.
    Append(E),
    /// Overwrites any unpublished record sharing its replacement key.
    Replace(E),
}

impl<E> PendingEvent<E> {
    /// Returns the wrapped event.
    pub fn event(&self) -> &E {
        match self {
            Self::Append(event) | Self::Replace(event) => event,
        }
    }
}

/// Capability of an entity that carries recorded events.
///
/// Implemented by any aggregate type; the persistence hook drains the
/// pending events and then clears them.
pub trait HasPendingEvents<E>: Send {
    /// Events recorded since the last drain, in recording order.
    fn pending_events(&self) -> &[PendingEvent<E>];

    /// Clears pending events after they have been written.
    fn clear_pending_events(&mut self);
}

/// Reusable event buffer that aggregates embed to record events.
#[derive(Debug, Clone)]
pub struct EventRecorder<E> {
    pending: Vec<PendingEvent<E>>,
}

impl<E> EventRecorder<E> {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Records an event that is appended on persistence.
    pub fn record(&mut self, event: E) {
        self.pending.push(PendingEvent::Append(event));
    }

    /// Records an event that replaces earlier unpublished events of the same
    /// type for the same aggregate.
    pub fn record_replaceable(&mut self, event: E) {
        self.pending.push(PendingEvent::Replace(event));
    }

    /// Whether any event is waiting to be persisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<E> Default for EventRecorder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send> HasPendingEvents<E> for EventRecorder<E> {
    fn pending_events(&self) -> &[PendingEvent<E>] {
        &self.pending
    }

    fn clear_pending_events(&mut self) {
        self.pending.clear();
    }
}

/// An entity scheduled for insertion, update or deletion in a unit of work.
///
/// Entities that carry recorded events expose them through
/// [`ScheduledEntity::event_source`]; all others keep the default.
pub trait ScheduledEntity<E>: Send {
    /// The entity's pending events, if it records any.
    fn event_source(&mut self) -> Option<&mut dyn HasPendingEvents<E>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_keeps_recording_order_and_kind() {
        let mut recorder = EventRecorder::new();
        recorder.record("created");
        recorder.record_replaceable("snapshot");
        recorder.record("renamed");

        assert_eq!(
            recorder.pending_events(),
            &[
                PendingEvent::Append("created"),
                PendingEvent::Replace("snapshot"),
                PendingEvent::Append("renamed"),
            ]
        );
    }

    #[test]
    fn test_clear_pending_events_empties_recorder() {
        let mut recorder = EventRecorder::new();
        recorder.record(1);

        recorder.clear_pending_events();

        assert!(recorder.is_empty());
        assert!(recorder.pending_events().is_empty());
    }
}
