//! In-memory storage partition with transactional event stores.
//!
//! A transaction works on a private copy of the partition's records and
//! swaps it in on commit. Publishing against a partition while one of its
//! transactions is open would be lost on commit, which is exactly what the
//! publisher refuses to do.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::error::OutboxError;
use herald_core::partition::{PartitionTransaction, StoragePartition};
use herald_core::record::{EventRecord, PageCursor};
use herald_core::store::EventStore;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Shared {
    records: Mutex<Vec<EventRecord>>,
    active_transactions: AtomicUsize,
    unpublished_queries: AtomicUsize,
    /// Remaining writes before every further write is rejected.
    write_budget: Mutex<Option<usize>>,
}

/// An in-memory partition. Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct InMemoryPartition {
    name: String,
    relational: bool,
    has_schema: bool,
    shared: Arc<Shared>,
}

impl InMemoryPartition {
    /// A relational partition with the event schema configured.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            relational: true,
            has_schema: true,
            shared: Arc::new(Shared::default()),
        }
    }

    /// A relational partition without the event table.
    #[must_use]
    pub fn without_schema(name: &str) -> Self {
        Self {
            has_schema: false,
            ..Self::new(name)
        }
    }

    /// A partition backed by a non-relational store.
    #[must_use]
    pub fn non_relational(name: &str) -> Self {
        Self {
            relational: false,
            has_schema: false,
            ..Self::new(name)
        }
    }

    /// Snapshot of the committed records.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn records(&self) -> Vec<EventRecord> {
        self.shared.records.lock().unwrap().clone()
    }

    /// Committed records that are still unpublished.
    pub fn unpublished(&self) -> Vec<EventRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.published_on.is_none())
            .collect()
    }

    /// Seeds a committed record directly.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert_committed(&self, record: EventRecord) {
        self.shared.records.lock().unwrap().push(record);
    }

    /// Marks a committed record as published, as another process would.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn publish_externally(&self, event_id: Uuid, at: DateTime<Utc>) {
        let mut records = self.shared.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.event_id == event_id) {
            record.published_on = Some(at);
        }
    }

    /// Number of unpublished-page queries served so far.
    pub fn unpublished_queries(&self) -> usize {
        self.shared.unpublished_queries.load(Ordering::SeqCst)
    }

    /// Allows `writes` more successful writes, then rejects every write.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn reject_writes_after(&self, writes: usize) {
        *self.shared.write_budget.lock().unwrap() = Some(writes);
    }

    fn open_transaction(&self) -> InMemoryTransaction {
        self.shared.active_transactions.fetch_add(1, Ordering::SeqCst);
        InMemoryTransaction {
            partition: self.name.clone(),
            staged: self.records(),
            shared: Arc::clone(&self.shared),
        }
    }
}

#[async_trait]
impl StoragePartition for InMemoryPartition {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_relational(&self) -> bool {
        self.relational
    }

    async fn has_event_schema(&self) -> Result<bool, OutboxError> {
        Ok(self.has_schema)
    }

    fn is_transaction_active(&self) -> bool {
        self.shared.active_transactions.load(Ordering::SeqCst) > 0
    }

    async fn begin(&self) -> Result<Box<dyn PartitionTransaction>, OutboxError> {
        Ok(Box::new(self.open_transaction()))
    }

    async fn event_store(&self) -> Result<Box<dyn EventStore>, OutboxError> {
        Ok(Box::new(InMemoryEventStore {
            target: Target::Committed,
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// An open in-memory transaction. Dropping it without commit discards its
/// writes.
#[derive(Debug)]
pub struct InMemoryTransaction {
    partition: String,
    staged: Vec<EventRecord>,
    shared: Arc<Shared>,
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        self.shared.active_transactions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PartitionTransaction for InMemoryTransaction {
    fn partition_name(&self) -> &str {
        &self.partition
    }

    fn event_store(&mut self) -> Box<dyn EventStore + '_> {
        Box::new(InMemoryEventStore {
            target: Target::Staged(&mut self.staged),
            shared: Arc::clone(&self.shared),
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), OutboxError> {
        let mut this = self;
        let staged = std::mem::take(&mut this.staged);
        *this.shared.records.lock().unwrap() = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), OutboxError> {
        Ok(())
    }
}

#[derive(Debug)]
enum Target<'a> {
    Committed,
    Staged(&'a mut Vec<EventRecord>),
}

/// Event store over either committed or transaction-staged records.
#[derive(Debug)]
pub struct InMemoryEventStore<'a> {
    target: Target<'a>,
    shared: Arc<Shared>,
}

impl InMemoryEventStore<'_> {
    fn with_records<R>(&mut self, f: impl FnOnce(&mut Vec<EventRecord>) -> R) -> R {
        match &mut self.target {
            Target::Committed => {
                let mut records = self.shared.records.lock().unwrap();
                f(&mut *records)
            }
            Target::Staged(records) => f(&mut **records),
        }
    }

    fn spend_write(&self) -> Result<(), OutboxError> {
        let mut budget = self.shared.write_budget.lock().unwrap();
        match budget.as_mut() {
            Some(0) => Err(OutboxError::Persistence("write rejected by partition".into())),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn insert(records: &mut Vec<EventRecord>, record: &EventRecord) -> Result<(), OutboxError> {
        if records.iter().any(|r| r.event_id == record.event_id) {
            return Err(OutboxError::Persistence(format!(
                "duplicate event_id {}",
                record.event_id
            )));
        }
        let mut unpublished = record.clone();
        unpublished.published_on = None;
        records.push(unpublished);
        Ok(())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore<'_> {
    async fn append(&mut self, record: &EventRecord) -> Result<(), OutboxError> {
        self.spend_write()?;
        self.with_records(|records| Self::insert(records, record))
    }

    async fn replace(&mut self, record: &EventRecord) -> Result<(), OutboxError> {
        self.spend_write()?;
        self.with_records(|records| {
            records.retain(|r| {
                r.published_on.is_some() || r.replacement_key() != record.replacement_key()
            });
            Self::insert(records, record)
        })
    }

    async fn unpublished_after(
        &mut self,
        after: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<EventRecord>, OutboxError> {
        self.shared.unpublished_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.with_records(|records| {
            let mut page: Vec<EventRecord> = records
                .iter()
                .filter(|r| r.published_on.is_none())
                .filter(|r| after.is_none_or(|cursor| r.cursor() > cursor))
                .cloned()
                .collect();
            page.sort_by_key(EventRecord::cursor);
            page.truncate(limit);
            page
        }))
    }

    async fn refresh(&mut self, record: &mut EventRecord) -> Result<bool, OutboxError> {
        let current = self.with_records(|records| {
            records
                .iter()
                .find(|r| r.event_id == record.event_id)
                .cloned()
        });
        Ok(current.map(|current| *record = current).is_some())
    }

    async fn publish(
        &mut self,
        record: &mut EventRecord,
        published_on: DateTime<Utc>,
    ) -> Result<(), OutboxError> {
        self.spend_write()?;
        let event_id = record.event_id;
        let stored = self.with_records(|records| {
            records
                .iter_mut()
                .find(|r| r.event_id == event_id)
                .map(|r| {
                    if r.published_on.is_none() {
                        r.published_on = Some(published_on);
                        Ok(())
                    } else {
                        Err(r.clone())
                    }
                })
        });
        match stored {
            None => return Err(OutboxError::RecordNotFound(event_id)),
            Some(Err(current)) => {
                *record = current;
                return Err(OutboxError::AlreadyPublished(event_id));
            }
            Some(Ok(())) => {}
        }
        record.published_on = Some(published_on);
        Ok(())
    }

    async fn type_names(&mut self) -> Result<Vec<String>, OutboxError> {
        Ok(self.with_records(|records| {
            records
                .iter()
                .map(|r| r.type_name.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        }))
    }

    async fn rename_type(&mut self, from: &str, to: &str) -> Result<u64, OutboxError> {
        self.spend_write()?;
        Ok(self.with_records(|records| {
            let mut changed = 0;
            for record in records.iter_mut().filter(|r| r.type_name == from) {
                to.clone_into(&mut record.type_name);
                changed += 1;
            }
            changed
        }))
    }

    async fn delete_type(&mut self, type_name: &str) -> Result<u64, OutboxError> {
        self.spend_write()?;
        Ok(self.with_records(|records| {
            let before = records.len();
            records.retain(|r| r.type_name != type_name);
            (before - records.len()) as u64
        }))
    }
}
