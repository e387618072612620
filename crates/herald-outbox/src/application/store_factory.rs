//! Builds event stores for named partitions.

use std::sync::Arc;

use herald_core::error::OutboxError;
use herald_core::partition::{PartitionRegistry, StoragePartition};
use herald_core::store::EventStore;

/// Name of the partition used when none is given.
pub const DEFAULT_PARTITION: &str = "default";

/// Creates partition-scoped event stores on demand.
#[derive(Clone)]
pub struct EventStoreFactory {
    registry: Arc<dyn PartitionRegistry>,
}

impl EventStoreFactory {
    /// Creates a factory over `registry`.
    #[must_use]
    pub fn new(registry: Arc<dyn PartitionRegistry>) -> Self {
        Self { registry }
    }

    /// Resolves a partition that can hold event records.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Configuration` if no partition has that name or
    /// the partition is not relational.
    pub fn partition(&self, name: &str) -> Result<Arc<dyn StoragePartition>, OutboxError> {
        let partition = self.registry.partition(name).ok_or_else(|| {
            OutboxError::Configuration(format!("partition \"{name}\" does not exist"))
        })?;
        if !partition.is_relational() {
            return Err(OutboxError::Configuration(format!(
                "partition \"{name}\" is not a relational partition"
            )));
        }
        Ok(partition)
    }

    /// A fresh event store bound to the named partition.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Configuration` for unknown or non-relational
    /// partitions, and propagates connection failures.
    pub async fn create(&self, name: &str) -> Result<Box<dyn EventStore>, OutboxError> {
        self.partition(name)?.event_store().await
    }

    /// A fresh event store bound to the `default` partition.
    ///
    /// # Errors
    ///
    /// See [`EventStoreFactory::create`].
    pub async fn create_default(&self) -> Result<Box<dyn EventStore>, OutboxError> {
        self.create(DEFAULT_PARTITION).await
    }
}

impl std::fmt::Debug for EventStoreFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStoreFactory").finish_non_exhaustive()
    }
}
