//! Event store abstraction.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::OutboxError;
use crate::record::{EventRecord, PageCursor};

/// Persistence boundary for event records, bound to one storage partition.
///
/// Stores are cheap to construct and hold no state shared with other
/// instances. Writes made through a store obtained from a
/// [`PartitionTransaction`](crate::partition::PartitionTransaction) become
/// part of that transaction.
#[async_trait]
pub trait EventStore: Send {
    /// Inserts a new unpublished record.
    async fn append(&mut self, record: &EventRecord) -> Result<(), OutboxError>;

    /// Removes every unpublished record sharing the record's replacement key,
    /// then inserts the record as unpublished.
    async fn replace(&mut self, record: &EventRecord) -> Result<(), OutboxError>;

    /// Returns up to `limit` unpublished records positioned strictly after
    /// `after`, ordered by `(occurred_on, event_id)`.
    async fn unpublished_after(
        &mut self,
        after: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<EventRecord>, OutboxError>;

    /// Reloads `record` from the partition, discarding the in-memory copy.
    /// Returns `false` if the record no longer exists.
    async fn refresh(&mut self, record: &mut EventRecord) -> Result<bool, OutboxError>;

    /// Marks `record` as published at `published_on` and persists it.
    ///
    /// Fails with `RecordNotFound` if the record is gone and with
    /// `AlreadyPublished` if it carries a publication time already, which is
    /// left as it was.
    async fn publish(
        &mut self,
        record: &mut EventRecord,
        published_on: DateTime<Utc>,
    ) -> Result<(), OutboxError>;

    /// Distinct stored type names, sorted ascending.
    async fn type_names(&mut self) -> Result<Vec<String>, OutboxError>;

    /// Rewrites every record of type `from` to type `to`. Returns the number
    /// of rows changed.
    async fn rename_type(&mut self, from: &str, to: &str) -> Result<u64, OutboxError>;

    /// Deletes every record of type `type_name`. Returns the number of rows
    /// removed.
    async fn delete_type(&mut self, type_name: &str) -> Result<u64, OutboxError>;

    /// Starts a fresh pass over the unpublished records, oldest first.
    fn all_unpublished(&self, batch_size: usize) -> UnpublishedEvents {
        UnpublishedEvents::new(batch_size)
    }
}

/// Lazy, finite cursor over unpublished records, fetched in keyset pages.
///
/// Records published while the pass runs simply drop out of later pages;
/// records left unpublished (for example because their lock was contended)
/// are not revisited within the same pass.
#[derive(Debug)]
pub struct UnpublishedEvents {
    batch_size: usize,
    buffer: VecDeque<EventRecord>,
    after: Option<PageCursor>,
    exhausted: bool,
}

impl UnpublishedEvents {
    /// Creates a cursor that fetches `batch_size` records per page.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            buffer: VecDeque::new(),
            after: None,
            exhausted: false,
        }
    }

    /// Returns the next unpublished record, fetching a new page when the
    /// current one is used up.
    ///
    /// # Errors
    ///
    /// Propagates the store's `OutboxError` when a page cannot be read.
    pub async fn next<S>(&mut self, store: &mut S) -> Result<Option<EventRecord>, OutboxError>
    where
        S: EventStore + ?Sized,
    {
        if self.buffer.is_empty() && !self.exhausted {
            let page = store.unpublished_after(self.after, self.batch_size).await?;
            if page.len() < self.batch_size {
                self.exhausted = true;
            }
            if let Some(last) = page.last() {
                self.after = Some(last.cursor());
            }
            self.buffer.extend(page);
        }
        Ok(self.buffer.pop_front())
    }

    /// Drains the cursor into a vector.
    ///
    /// # Errors
    ///
    /// Propagates the store's `OutboxError` when a page cannot be read.
    pub async fn collect<S>(mut self, store: &mut S) -> Result<Vec<EventRecord>, OutboxError>
    where
        S: EventStore + ?Sized,
    {
        let mut records = Vec::new();
        while let Some(record) = self.next(store).await? {
            records.push(record);
        }
        Ok(records)
    }
}
