//! Publish passes against a `PostgreSQL` partition and advisory locks.
//!
//! Run with `DATABASE_URL` pointing at a disposable database and
//! `--include-ignored`.

use std::sync::Arc;
use std::time::Duration;

use herald_core::clock::{Clock, SystemClock};
use herald_core::codec::JsonEventCodec;
use herald_core::config::OutboxSettings;
use herald_core::dispatcher::DomainEventDispatcher;
use herald_core::lock::{LockProvider, lock_name};
use herald_core::partition::{Partitions, StoragePartition};
use herald_core::record::EventRecord;
use herald_core::store::EventStore;
use herald_event_store::pg_lock::PgAdvisoryLockProvider;
use herald_event_store::pg_partition::PgPartition;
use herald_outbox::application::publish_hook::PublishDomainEvents;
use herald_test_support::{RecordingDispatcher, StalledDispatcher, TestEvent};
use sqlx::PgPool;
use uuid::Uuid;

/// Stores one unpublished `Created` event and returns its lock name.
async fn seed(partition: &PgPartition, aggregate_root: &str) -> String {
    let event = TestEvent::created(Uuid::now_v7(), aggregate_root, SystemClock.now());
    let record = EventRecord::from_event(&event, &JsonEventCodec::<TestEvent>::new()).unwrap();
    let mut store = partition.event_store().await.unwrap();
    store.append(&record).await.unwrap();
    lock_name(event.metadata.event_id)
}

fn default_partition(pool: &PgPool) -> PgPartition {
    PgPartition::new("default", pool.clone(), &OutboxSettings::default()).unwrap()
}

fn publisher(
    partition: &PgPartition,
    locks: Arc<dyn LockProvider>,
    dispatcher: Arc<dyn DomainEventDispatcher<TestEvent>>,
) -> PublishDomainEvents<TestEvent> {
    let registry = Partitions::new().with(Arc::new(partition.clone())).unwrap();
    PublishDomainEvents::new(
        Arc::new(registry),
        locks,
        Arc::new(JsonEventCodec::<TestEvent>::new()),
        dispatcher,
        Arc::new(SystemClock),
    )
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_passes_sharing_one_lock_provider_dispatch_once(pool: PgPool) {
    // Arrange: two tasks of one process share the partition and the lock
    // session.
    let partition = default_partition(&pool);
    seed(&partition, "a1").await;
    let locks = Arc::new(PgAdvisoryLockProvider::from_pool(&pool).await.unwrap());
    let dispatcher = Arc::new(RecordingDispatcher::<TestEvent>::yielding());
    let first = publisher(&partition, locks.clone(), dispatcher.clone());
    let second = publisher(&partition, locks.clone(), dispatcher.clone());

    // Act
    let (a, b) = tokio::join!(first.on_terminate(), second.on_terminate());

    // Assert
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.published + b.published, 1);
    assert_eq!(dispatcher.dispatched().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_cancelled_pass_frees_lock_for_other_processes(pool: PgPool) {
    let partition = default_partition(&pool);
    let name = seed(&partition, "a1").await;
    let ours = Arc::new(PgAdvisoryLockProvider::from_pool(&pool).await.unwrap());
    let theirs = PgAdvisoryLockProvider::from_pool(&pool).await.unwrap();
    let hook = publisher(&partition, ours.clone(), Arc::new(StalledDispatcher));

    let result = tokio::time::timeout(Duration::from_millis(200), hook.on_terminate()).await;
    assert!(result.is_err());

    // The abandoned lock is released on a spawned task.
    let mut acquired = false;
    for _ in 0..50 {
        acquired = theirs.acquire(&name).await.unwrap();
        if acquired {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(acquired);
    theirs.release(&name).await.unwrap();
}
