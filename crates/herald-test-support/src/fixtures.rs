//! Event and entity fixtures shared by the outbox tests.

use chrono::{DateTime, TimeZone, Utc};
use herald_core::aggregate::{EventRecorder, HasPendingEvents, ScheduledEntity};
use herald_core::clock::Clock;
use herald_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed timestamp used across tests.
///
/// # Panics
///
/// Never; the literal date is valid.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// Type name of [`TestEventKind::Created`].
pub const CREATED_EVENT_TYPE: &str = "test.created";
/// Type name of [`TestEventKind::Renamed`].
pub const RENAMED_EVENT_TYPE: &str = "test.renamed";
/// Type name of [`TestEventKind::StatusChanged`].
pub const STATUS_CHANGED_EVENT_TYPE: &str = "test.status_changed";

/// Event payload variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestEventKind {
    /// The entity was created.
    Created {
        /// Initial name.
        name: String,
    },
    /// The entity was renamed.
    Renamed {
        /// New name.
        name: String,
    },
    /// Latest-state event, stored with replace semantics.
    StatusChanged {
        /// Current status.
        status: String,
    },
}

/// Domain event envelope used by the tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: TestEventKind,
}

impl TestEvent {
    /// Builds a `Created` event with an explicit identifier.
    #[must_use]
    pub fn created(event_id: Uuid, aggregate_root: &str, occurred_on: DateTime<Utc>) -> Self {
        Self {
            metadata: EventMetadata {
                event_id,
                aggregate_root: aggregate_root.to_owned(),
                occurred_on,
            },
            kind: TestEventKind::Created {
                name: aggregate_root.to_owned(),
            },
        }
    }
}

impl DomainEvent for TestEvent {
    fn event_type(&self) -> &'static str {
        match &self.kind {
            TestEventKind::Created { .. } => CREATED_EVENT_TYPE,
            TestEventKind::Renamed { .. } => RENAMED_EVENT_TYPE,
            TestEventKind::StatusChanged { .. } => STATUS_CHANGED_EVENT_TYPE,
        }
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_types() -> &'static [&'static str] {
        &[
            CREATED_EVENT_TYPE,
            RENAMED_EVENT_TYPE,
            STATUS_CHANGED_EVENT_TYPE,
        ]
    }
}

/// An aggregate that records [`TestEvent`]s.
#[derive(Debug)]
pub struct TestEntity {
    /// Aggregate identifier.
    pub id: String,
    /// Current name.
    pub name: String,
    events: EventRecorder<TestEvent>,
}

impl TestEntity {
    /// Creates the entity and records `Created`.
    #[must_use]
    pub fn create(id: &str, clock: &dyn Clock) -> Self {
        let mut entity = Self {
            id: id.to_owned(),
            name: id.to_owned(),
            events: EventRecorder::new(),
        };
        entity.raise(
            TestEventKind::Created {
                name: id.to_owned(),
            },
            clock,
        );
        entity
    }

    /// Renames the entity and records `Renamed`.
    pub fn rename(&mut self, name: &str, clock: &dyn Clock) {
        self.name = name.to_owned();
        self.raise(
            TestEventKind::Renamed {
                name: name.to_owned(),
            },
            clock,
        );
    }

    /// Records a replaceable `StatusChanged`.
    pub fn change_status(&mut self, status: &str, clock: &dyn Clock) {
        let event = TestEvent {
            metadata: EventMetadata::new(self.id.clone(), clock.now()),
            kind: TestEventKind::StatusChanged {
                status: status.to_owned(),
            },
        };
        self.events.record_replaceable(event);
    }

    /// Records an already built event.
    pub fn record(&mut self, event: TestEvent) {
        self.events.record(event);
    }

    /// Events still waiting to be persisted.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.events.pending_events().len()
    }

    fn raise(&mut self, kind: TestEventKind, clock: &dyn Clock) {
        let event = TestEvent {
            metadata: EventMetadata::new(self.id.clone(), clock.now()),
            kind,
        };
        self.events.record(event);
    }
}

impl ScheduledEntity<TestEvent> for TestEntity {
    fn event_source(&mut self) -> Option<&mut dyn HasPendingEvents<TestEvent>> {
        Some(&mut self.events)
    }
}

/// An entity without recorded events.
#[derive(Debug, Default)]
pub struct PlainEntity;

impl ScheduledEntity<TestEvent> for PlainEntity {}
