//! Integration tests for the `PostgreSQL` event store, partition and locks.
//!
//! Run with `DATABASE_URL` pointing at a disposable database and
//! `--include-ignored`.

use chrono::{Duration, TimeZone, Utc};
use herald_core::config::OutboxSettings;
use herald_core::error::OutboxError;
use herald_core::lock::{LockProvider, lock_name};
use herald_core::partition::{PartitionTransaction, StoragePartition};
use herald_core::record::EventRecord;
use herald_core::store::EventStore;
use herald_event_store::pg_lock::PgAdvisoryLockProvider;
use herald_event_store::pg_partition::PgPartition;
use sqlx::PgPool;
use uuid::Uuid;

fn base_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// Helper to build an unpublished `EventRecord`.
fn make_record(aggregate_root: &str, type_name: &str, offset_secs: i64) -> EventRecord {
    EventRecord {
        event_id: Uuid::new_v4(),
        type_name: type_name.to_string(),
        aggregate_root: aggregate_root.to_string(),
        occurred_on: base_time() + Duration::seconds(offset_secs),
        event_body: format!(r#"{{"offset":{offset_secs}}}"#),
        published_on: None,
    }
}

fn partition(pool: PgPool) -> PgPartition {
    PgPartition::new("default", pool, &OutboxSettings::default()).unwrap()
}

// --- append + listing ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_append_and_list_unpublished_oldest_first(pool: PgPool) {
    let partition = partition(pool);
    let mut store = partition.event_store().await.unwrap();
    let newer = make_record("a1", "test.created", 20);
    let older = make_record("a2", "test.created", 10);

    store.append(&newer).await.unwrap();
    store.append(&older).await.unwrap();

    let unpublished = store.all_unpublished(100).collect(store.as_mut()).await.unwrap();
    assert_eq!(unpublished, vec![older, newer]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_listing_pages_through_backlog(pool: PgPool) {
    let partition = partition(pool);
    let mut store = partition.event_store().await.unwrap();
    let mut expected = Vec::new();
    for offset in 0..7 {
        let record = make_record("a1", "test.created", offset);
        store.append(&record).await.unwrap();
        expected.push(record.event_id);
    }

    let listed: Vec<Uuid> = store
        .all_unpublished(3)
        .collect(store.as_mut())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.event_id)
        .collect();

    assert_eq!(listed, expected);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_duplicate_event_id_is_a_persistence_error(pool: PgPool) {
    let partition = partition(pool);
    let mut store = partition.event_store().await.unwrap();
    let record = make_record("a1", "test.created", 0);
    store.append(&record).await.unwrap();

    let result = store.append(&record).await;

    assert!(matches!(result, Err(OutboxError::Persistence(_))));
}

// --- replace ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_replace_keeps_one_record_per_key(pool: PgPool) {
    let partition = partition(pool);
    let mut store = partition.event_store().await.unwrap();
    let first = make_record("a1", "test.status_changed", 0);
    let second = make_record("a1", "test.status_changed", 5);
    let other_aggregate = make_record("a2", "test.status_changed", 1);

    store.replace(&first).await.unwrap();
    store.replace(&other_aggregate).await.unwrap();
    store.replace(&second).await.unwrap();

    let unpublished = store.all_unpublished(100).collect(store.as_mut()).await.unwrap();
    assert_eq!(unpublished, vec![other_aggregate, second]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_replace_leaves_published_history(pool: PgPool) {
    let partition = partition(pool);
    let mut store = partition.event_store().await.unwrap();
    let mut first = make_record("a1", "test.status_changed", 0);
    store.append(&first).await.unwrap();
    store.publish(&mut first, base_time()).await.unwrap();

    store
        .replace(&make_record("a1", "test.status_changed", 5))
        .await
        .unwrap();

    assert!(store.refresh(&mut first).await.unwrap());
    assert_eq!(first.published_on, Some(base_time()));
}

// --- refresh + publish ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_refresh_sees_publication_by_another_store(pool: PgPool) {
    let partition = partition(pool);
    let mut ours = partition.event_store().await.unwrap();
    let mut theirs = partition.event_store().await.unwrap();
    let mut record = make_record("a1", "test.created", 0);
    ours.append(&record).await.unwrap();
    let mut their_copy = record.clone();

    theirs.publish(&mut their_copy, base_time()).await.unwrap();

    assert!(record.published_on.is_none());
    assert!(ours.refresh(&mut record).await.unwrap());
    assert_eq!(record.published_on, Some(base_time()));
    assert!(ours.all_unpublished(10).collect(ours.as_mut()).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_refresh_and_publish_of_deleted_record(pool: PgPool) {
    let partition = partition(pool);
    let mut store = partition.event_store().await.unwrap();
    let mut record = make_record("a1", "legacy.gone", 0);
    store.append(&record).await.unwrap();
    store.delete_type("legacy.gone").await.unwrap();

    assert!(!store.refresh(&mut record).await.unwrap());
    let result = store.publish(&mut record, base_time()).await;
    assert!(matches!(result, Err(OutboxError::RecordNotFound(id)) if id == record.event_id));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_publish_keeps_first_publication_time(pool: PgPool) {
    let partition = partition(pool);
    let mut store = partition.event_store().await.unwrap();
    let mut record = make_record("a1", "test.created", 0);
    store.append(&record).await.unwrap();
    let mut stale = record.clone();
    store.publish(&mut record, base_time()).await.unwrap();

    let result = store
        .publish(&mut stale, base_time() + Duration::hours(1))
        .await;

    assert!(matches!(result, Err(OutboxError::AlreadyPublished(id)) if id == record.event_id));
    assert_eq!(stale.published_on, Some(base_time()));
    assert!(store.refresh(&mut record).await.unwrap());
    assert_eq!(record.published_on, Some(base_time()));
}

// --- transactions ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_rolled_back_transaction_leaves_no_record(pool: PgPool) {
    let partition = partition(pool);
    let mut tx = partition.begin().await.unwrap();
    assert!(partition.is_transaction_active());
    tx.event_store()
        .append(&make_record("a1", "test.created", 0))
        .await
        .unwrap();

    tx.rollback().await.unwrap();

    assert!(!partition.is_transaction_active());
    let mut store = partition.event_store().await.unwrap();
    assert!(store.all_unpublished(10).collect(store.as_mut()).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_transaction_writes_are_invisible_until_commit(pool: PgPool) {
    let partition = partition(pool);
    let mut committed = partition.event_store().await.unwrap();
    let mut tx = partition.begin_transaction().await.unwrap();
    sqlx::query("SELECT 1").execute(tx.connection()).await.unwrap();
    tx.event_store()
        .append(&make_record("a1", "test.created", 0))
        .await
        .unwrap();

    let before = committed
        .all_unpublished(10)
        .collect(committed.as_mut())
        .await
        .unwrap();
    Box::new(tx).commit().await.unwrap();
    let after = committed
        .all_unpublished(10)
        .collect(committed.as_mut())
        .await
        .unwrap();

    assert!(before.is_empty());
    assert_eq!(after.len(), 1);
}

// --- schema ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_schema_detection_and_creation(pool: PgPool) {
    let settings = OutboxSettings {
        table_name: "tenant_event".to_string(),
        ..OutboxSettings::default()
    };
    let custom = PgPartition::new("tenant_a", pool.clone(), &settings).unwrap();

    assert!(partition(pool).has_event_schema().await.unwrap());
    assert!(!custom.has_event_schema().await.unwrap());
    custom.ensure_schema().await.unwrap();
    assert!(custom.has_event_schema().await.unwrap());
}

// --- name maintenance ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_type_names_rename_and_delete(pool: PgPool) {
    let partition = partition(pool);
    let mut store = partition.event_store().await.unwrap();
    store.append(&make_record("a1", "old.name", 0)).await.unwrap();
    store.append(&make_record("a2", "old.name", 1)).await.unwrap();
    store.append(&make_record("a3", "doomed", 2)).await.unwrap();

    assert_eq!(store.type_names().await.unwrap(), vec!["doomed", "old.name"]);
    assert_eq!(store.rename_type("old.name", "new.name").await.unwrap(), 2);
    assert_eq!(store.delete_type("doomed").await.unwrap(), 1);
    assert_eq!(store.type_names().await.unwrap(), vec!["new.name"]);
}

// --- advisory locks ---

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_advisory_lock_excludes_other_sessions(pool: PgPool) {
    let ours = PgAdvisoryLockProvider::from_pool(&pool).await.unwrap();
    let theirs = PgAdvisoryLockProvider::from_pool(&pool).await.unwrap();
    let name = lock_name(Uuid::new_v4());

    assert!(ours.acquire(&name).await.unwrap());
    assert!(!theirs.acquire(&name).await.unwrap());

    ours.release(&name).await.unwrap();
    assert!(theirs.acquire(&name).await.unwrap());
    theirs.release(&name).await.unwrap();
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_advisory_lock_is_refused_to_its_own_holder(pool: PgPool) {
    let locks = PgAdvisoryLockProvider::from_pool(&pool).await.unwrap();
    let name = lock_name(Uuid::new_v4());

    assert!(locks.acquire(&name).await.unwrap());
    assert!(!locks.acquire(&name).await.unwrap());

    locks.release(&name).await.unwrap();
    assert!(locks.acquire(&name).await.unwrap());
    locks.release(&name).await.unwrap();
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL"]
async fn test_released_lock_is_free_for_other_sessions(pool: PgPool) {
    let ours = PgAdvisoryLockProvider::from_pool(&pool).await.unwrap();
    let theirs = PgAdvisoryLockProvider::from_pool(&pool).await.unwrap();
    let name = lock_name(Uuid::new_v4());
    assert!(ours.acquire(&name).await.unwrap());
    // A second acquire on the holding provider must not stack a second
    // session-level hold that one release would leave behind.
    assert!(!ours.acquire(&name).await.unwrap());

    ours.release(&name).await.unwrap();

    assert!(theirs.acquire(&name).await.unwrap());
    theirs.release(&name).await.unwrap();
}
