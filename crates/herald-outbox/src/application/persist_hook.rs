//! Persist-on-commit hook.
//!
//! Runs in the pre-commit phase of a unit of work, so the event records it
//! writes share the transaction of the entity changes that produced them. If
//! the transaction rolls back, so do the records.

use std::sync::Arc;

use herald_core::aggregate::{HasPendingEvents, PendingEvent};
use herald_core::codec::EventCodec;
use herald_core::error::OutboxError;
use herald_core::event::DomainEvent;
use herald_core::partition::PartitionTransaction;
use herald_core::record::EventRecord;
use herald_core::store::EventStore;
use tracing::{debug, instrument};

use crate::domain::change_set::ChangeSet;
use crate::domain::reports::PersistReport;

/// Drains recorded events from scheduled entities into the event store.
pub struct PersistDomainEvents<E> {
    codec: Arc<dyn EventCodec<E>>,
}

impl<E: DomainEvent> PersistDomainEvents<E> {
    /// Creates the hook.
    #[must_use]
    pub fn new(codec: Arc<dyn EventCodec<E>>) -> Self {
        Self { codec }
    }

    /// Writes the pending events of every scheduled entity through `tx`.
    ///
    /// Taking the transaction by reference makes it impossible to run the
    /// hook outside one.
    ///
    /// # Errors
    ///
    /// Propagates encoding and store failures. The failing entity keeps its
    /// pending events and the caller is expected to roll `tx` back.
    #[instrument(skip_all, fields(partition = tx.partition_name(), scheduled = changes.len()))]
    pub async fn on_flush(
        &self,
        tx: &mut dyn PartitionTransaction,
        changes: ChangeSet<'_, E>,
    ) -> Result<PersistReport, OutboxError> {
        let mut store = tx.event_store();
        let mut report = PersistReport::default();

        for (_, entity) in changes.into_drain_order() {
            let Some(source) = entity.event_source() else {
                continue;
            };
            if source.pending_events().is_empty() {
                continue;
            }
            self.store_recorded_events(source, store.as_mut(), &mut report)
                .await?;
        }

        debug!(
            entities = report.entities,
            appended = report.appended,
            replaced = report.replaced,
            "persisted recorded domain events"
        );
        Ok(report)
    }

    async fn store_recorded_events(
        &self,
        source: &mut dyn HasPendingEvents<E>,
        store: &mut dyn EventStore,
        report: &mut PersistReport,
    ) -> Result<(), OutboxError> {
        for pending in source.pending_events() {
            let record = EventRecord::from_event(pending.event(), self.codec.as_ref())?;
            match pending {
                PendingEvent::Append(_) => {
                    store.append(&record).await?;
                    report.appended += 1;
                }
                PendingEvent::Replace(_) => {
                    store.replace(&record).await?;
                    report.replaced += 1;
                }
            }
        }

        source.clear_pending_events();
        report.entities += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use herald_core::codec::JsonEventCodec;
    use herald_core::error::OutboxError;
    use herald_core::partition::StoragePartition;
    use herald_test_support::{
        FixedClock, InMemoryPartition, PlainEntity, SteppingClock, TestEntity, TestEvent,
        TestEventKind, fixed_now,
    };

    use super::PersistDomainEvents;
    use crate::domain::change_set::ChangeSet;

    fn hook() -> PersistDomainEvents<TestEvent> {
        PersistDomainEvents::new(Arc::new(JsonEventCodec::<TestEvent>::new()))
    }

    #[tokio::test]
    async fn test_on_flush_appends_events_of_inserted_entity() {
        // Arrange
        let clock = FixedClock(fixed_now());
        let partition = InMemoryPartition::new("default");
        let mut entity = TestEntity::create("a1", &clock);

        // Act
        let mut tx = partition.begin().await.unwrap();
        let mut changes = ChangeSet::<TestEvent>::new();
        changes.insertion(&mut entity);
        let report = hook().on_flush(tx.as_mut(), changes).await.unwrap();
        tx.commit().await.unwrap();

        // Assert
        assert_eq!(report.appended, 1);
        assert_eq!(report.entities, 1);
        assert_eq!(entity.pending_count(), 0);

        let records = partition.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].type_name, "test.created");
        assert_eq!(records[0].aggregate_root, "a1");
        assert_eq!(records[0].occurred_on, fixed_now());
        assert!(records[0].published_on.is_none());
    }

    #[tokio::test]
    async fn test_on_flush_skips_entities_without_events() {
        let clock = FixedClock(fixed_now());
        let partition = InMemoryPartition::new("default");
        let mut plain = PlainEntity;
        let mut entity = TestEntity::create("a1", &clock);
        entity.rename("renamed", &clock);

        let mut tx = partition.begin().await.unwrap();
        let mut changes = ChangeSet::<TestEvent>::new();
        changes.insertion(&mut plain).update(&mut entity);
        let report = hook().on_flush(tx.as_mut(), changes).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(report.entities, 1);
        assert_eq!(report.appended, 2);
        assert_eq!(partition.records().len(), 2);
    }

    #[tokio::test]
    async fn test_on_flush_drains_collection_owners() {
        let clock = FixedClock(fixed_now());
        let partition = InMemoryPartition::new("default");
        let mut owner = TestEntity::create("owner", &clock);

        let mut tx = partition.begin().await.unwrap();
        let mut changes = ChangeSet::<TestEvent>::new();
        changes.collection_update(&mut owner);
        hook().on_flush(tx.as_mut(), changes).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(partition.records().len(), 1);
        assert_eq!(owner.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_on_flush_follows_schedule_then_recording_order() {
        // Arrange: every event shares one coarse timestamp.
        let clock = FixedClock(fixed_now());
        let partition = InMemoryPartition::new("default");
        let mut updated = TestEntity::create("updated", &clock);
        let mut inserted = TestEntity::create("inserted", &clock);
        inserted.rename("inserted-2", &clock);
        let mut owner = TestEntity::create("owner", &clock);

        // Act: scheduled out of kind order.
        let mut tx = partition.begin().await.unwrap();
        let mut changes = ChangeSet::<TestEvent>::new();
        changes
            .collection_update(&mut owner)
            .update(&mut updated)
            .insertion(&mut inserted);
        hook().on_flush(tx.as_mut(), changes).await.unwrap();
        tx.commit().await.unwrap();

        // Assert: insertions, then updates, then collection owners.
        let written: Vec<(String, String)> = partition
            .records()
            .into_iter()
            .map(|r| (r.aggregate_root, r.type_name))
            .collect();
        assert_eq!(
            written,
            vec![
                ("inserted".to_owned(), "test.created".to_owned()),
                ("inserted".to_owned(), "test.renamed".to_owned()),
                ("updated".to_owned(), "test.created".to_owned()),
                ("owner".to_owned(), "test.created".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn test_on_flush_replaces_unpublished_latest_state_events() {
        let clock = SteppingClock::new(fixed_now(), Duration::seconds(1));
        let partition = InMemoryPartition::new("default");
        let mut entity = TestEntity::create("a1", &clock);
        entity.change_status("draft", &clock);

        let mut tx = partition.begin().await.unwrap();
        let mut changes = ChangeSet::<TestEvent>::new();
        changes.insertion(&mut entity);
        hook().on_flush(tx.as_mut(), changes).await.unwrap();
        tx.commit().await.unwrap();

        entity.change_status("active", &clock);
        let mut tx = partition.begin().await.unwrap();
        let mut changes = ChangeSet::<TestEvent>::new();
        changes.update(&mut entity);
        let report = hook().on_flush(tx.as_mut(), changes).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(report.replaced, 1);
        let statuses: Vec<_> = partition
            .records()
            .into_iter()
            .filter(|r| r.type_name == "test.status_changed")
            .collect();
        assert_eq!(statuses.len(), 1);
        let decoded: TestEvent = decode_status(&statuses[0].event_body);
        assert_eq!(
            decoded.kind,
            TestEventKind::StatusChanged {
                status: "active".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn test_rolled_back_transaction_leaves_no_records() {
        let clock = FixedClock(fixed_now());
        let partition = InMemoryPartition::new("default");
        let mut entity = TestEntity::create("a1", &clock);

        let mut tx = partition.begin().await.unwrap();
        let mut changes = ChangeSet::<TestEvent>::new();
        changes.insertion(&mut entity);
        hook().on_flush(tx.as_mut(), changes).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(partition.records().is_empty());
        assert!(!partition.is_transaction_active());
    }

    #[tokio::test]
    async fn test_store_failure_propagates_and_keeps_pending_events() {
        let clock = FixedClock(fixed_now());
        let partition = InMemoryPartition::new("default");
        let mut entity = TestEntity::create("a1", &clock);
        entity.rename("a1-renamed", &clock);
        partition.reject_writes_after(1);

        let mut tx = partition.begin().await.unwrap();
        let mut changes = ChangeSet::<TestEvent>::new();
        changes.insertion(&mut entity);
        let result = hook().on_flush(tx.as_mut(), changes).await;
        drop(tx);

        assert!(matches!(result, Err(OutboxError::Persistence(_))));
        assert_eq!(entity.pending_count(), 2);
        assert!(partition.records().is_empty());
    }

    fn decode_status(body: &str) -> TestEvent {
        use herald_core::codec::EventCodec;
        JsonEventCodec::<TestEvent>::new()
            .decode("test.status_changed", body)
            .unwrap()
    }
}
