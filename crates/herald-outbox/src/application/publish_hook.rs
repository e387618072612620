//! Publish-on-terminate hook.
//!
//! Runs once after a request or command has completed, outside any
//! transaction. Every eligible partition is scanned for unpublished records
//! and each record goes through the locked publish protocol:
//!
//! 1. try the `domain-event-{event_id}` lock, skipping the record if it is
//!    held elsewhere;
//! 2. refresh the record, since another process may have published it after
//!    the scan;
//! 3. if it is still unpublished, decode it, dispatch it and mark it
//!    published;
//! 4. release the lock, whatever happened in 2 and 3.
//!
//! The lock is owned by a guard for the duration of 2 and 3. If the pass is
//! cancelled or a subscriber panics, dropping the guard releases the lock on
//! a spawned task.

use std::sync::Arc;

use herald_core::clock::Clock;
use herald_core::codec::EventCodec;
use herald_core::config::DEFAULT_BATCH_SIZE;
use herald_core::dispatcher::DomainEventDispatcher;
use herald_core::error::OutboxError;
use herald_core::event::DomainEvent;
use herald_core::lock::{LockProvider, lock_name};
use herald_core::partition::{PartitionRegistry, StoragePartition};
use herald_core::record::EventRecord;
use herald_core::store::EventStore;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::reports::PublishReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Published,
    Contended,
    AlreadyPublished,
    Vanished,
}

/// Publishes unpublished events from every registered partition.
pub struct PublishDomainEvents<E: Send + 'static> {
    registry: Arc<dyn PartitionRegistry>,
    locks: Arc<dyn LockProvider>,
    codec: Arc<dyn EventCodec<E>>,
    dispatcher: Arc<dyn DomainEventDispatcher<E>>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
}

impl<E> PublishDomainEvents<E>
where
    E: DomainEvent + Send + 'static,
{
    /// Creates the hook with the default page size.
    #[must_use]
    pub fn new(
        registry: Arc<dyn PartitionRegistry>,
        locks: Arc<dyn LockProvider>,
        codec: Arc<dyn EventCodec<E>>,
        dispatcher: Arc<dyn DomainEventDispatcher<E>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            locks,
            codec,
            dispatcher,
            clock,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets how many unpublished records are fetched per page.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Runs one publish pass over every registered partition.
    ///
    /// # Errors
    ///
    /// Stops at the first store, decode, dispatch or lock failure. The lock
    /// of the failing record is released and the record stays unpublished
    /// for a later pass.
    #[instrument(skip(self))]
    pub async fn on_terminate(&self) -> Result<PublishReport, OutboxError> {
        let mut report = PublishReport::default();

        for partition in self.registry.partitions() {
            if let Some(reason) = skip_reason(partition.as_ref()).await? {
                debug!(partition = partition.name(), reason, "skipping partition");
                report.partitions_skipped += 1;
                continue;
            }
            report.partitions_visited += 1;
            self.publish_partition(partition.as_ref(), &mut report)
                .await?;
        }

        info!(
            published = report.published,
            contended = report.contended,
            already_published = report.already_published,
            partitions = report.partitions_visited,
            "publish pass finished"
        );
        Ok(report)
    }

    async fn publish_partition(
        &self,
        partition: &dyn StoragePartition,
        report: &mut PublishReport,
    ) -> Result<(), OutboxError> {
        let mut store = partition.event_store().await?;
        let mut unpublished = store.all_unpublished(self.batch_size);

        while let Some(record) = unpublished.next(store.as_mut()).await? {
            match self.publish_event(record, store.as_mut()).await? {
                Outcome::Published => report.published += 1,
                Outcome::Contended => report.contended += 1,
                Outcome::AlreadyPublished => report.already_published += 1,
                Outcome::Vanished => report.vanished += 1,
            }
        }
        Ok(())
    }

    #[instrument(skip_all, fields(event_id = %record.event_id, type_name = %record.type_name))]
    async fn publish_event(
        &self,
        mut record: EventRecord,
        store: &mut dyn EventStore,
    ) -> Result<Outcome, OutboxError> {
        let name = lock_name(record.event_id);
        if !self.locks.acquire(&name).await? {
            debug!("lock held elsewhere, leaving event for a later pass");
            return Ok(Outcome::Contended);
        }

        let guard = HeldLock::new(Arc::clone(&self.locks), name);
        let outcome = self.publish_locked(&mut record, store).await;
        let released = guard.release().await;

        match (outcome, released) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Err(e), released) => {
                warn!(error = %e, "publishing failed, event stays unpublished");
                if let Err(release_error) = released {
                    warn!(error = %release_error, "failed to release publication lock");
                }
                Err(e)
            }
            (Ok(_), Err(e)) => Err(e),
        }
    }

    async fn publish_locked(
        &self,
        record: &mut EventRecord,
        store: &mut dyn EventStore,
    ) -> Result<Outcome, OutboxError> {
        if !store.refresh(record).await? {
            return Ok(Outcome::Vanished);
        }
        if record.is_published() {
            return Ok(Outcome::AlreadyPublished);
        }

        let event = self.codec.decode(&record.type_name, &record.event_body)?;
        self.dispatcher.dispatch(event).await?;
        match store.publish(record, self.clock.now()).await {
            Ok(()) => {
                debug!("event published");
                Ok(Outcome::Published)
            }
            Err(OutboxError::AlreadyPublished(_)) => {
                error!("event was published elsewhere while this process held its lock");
                Ok(Outcome::AlreadyPublished)
            }
            Err(e) => Err(e),
        }
    }
}

/// A publication lock taken by this pass.
///
/// `release` is the normal exit. A guard dropped without it (the pass future
/// was dropped, or a subscriber panicked) releases on a spawned task.
struct HeldLock {
    locks: Arc<dyn LockProvider>,
    name: String,
    released: bool,
}

impl HeldLock {
    fn new(locks: Arc<dyn LockProvider>, name: String) -> Self {
        Self {
            locks,
            name,
            released: false,
        }
    }

    async fn release(mut self) -> Result<(), OutboxError> {
        let result = self.locks.release(&self.name).await;
        self.released = true;
        result
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let locks = Arc::clone(&self.locks);
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(lock = %name, "publication abandoned, releasing lock");
                runtime.spawn(async move {
                    if let Err(e) = locks.release(&name).await {
                        warn!(lock = %name, error = %e, "failed to release abandoned lock");
                    }
                });
            }
            Err(_) => {
                error!(lock = %name, "no runtime left to release abandoned lock");
            }
        }
    }
}

async fn skip_reason(
    partition: &dyn StoragePartition,
) -> Result<Option<&'static str>, OutboxError> {
    if !partition.is_relational() {
        return Ok(Some("not a relational partition"));
    }
    if !partition.has_event_schema().await? {
        return Ok(Some("no event record schema"));
    }
    if partition.is_transaction_active() {
        return Ok(Some("transaction active"));
    }
    Ok(None)
}
