//! Storage partitions and the registry that enumerates them.
//!
//! A partition is an independently connected, independently transacted data
//! store (for example one tenant's database). Event records never cross
//! partitions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OutboxError;
use crate::store::EventStore;

/// An open transaction against one partition.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait PartitionTransaction: Send {
    /// Name of the partition the transaction belongs to.
    fn partition_name(&self) -> &str;

    /// An event store whose writes join this transaction.
    fn event_store(&mut self) -> Box<dyn EventStore + '_>;

    /// Commits every write made through the transaction.
    async fn commit(self: Box<Self>) -> Result<(), OutboxError>;

    /// Discards every write made through the transaction.
    async fn rollback(self: Box<Self>) -> Result<(), OutboxError>;
}

/// One registered storage partition.
#[async_trait]
pub trait StoragePartition: Send + Sync {
    /// Registry name of the partition.
    fn name(&self) -> &str;

    /// Whether the partition is backed by a relational store able to hold
    /// event records.
    fn is_relational(&self) -> bool {
        true
    }

    /// Whether the event record table exists in this partition.
    async fn has_event_schema(&self) -> Result<bool, OutboxError>;

    /// Whether a transaction is currently open against this partition.
    fn is_transaction_active(&self) -> bool;

    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn PartitionTransaction>, OutboxError>;

    /// A fresh event store reading and writing committed state.
    async fn event_store(&self) -> Result<Box<dyn EventStore>, OutboxError>;
}

/// Lists every registered partition.
pub trait PartitionRegistry: Send + Sync {
    /// All partitions, in registration order.
    fn partitions(&self) -> Vec<Arc<dyn StoragePartition>>;

    /// Looks a partition up by name.
    fn partition(&self, name: &str) -> Option<Arc<dyn StoragePartition>>;
}

/// In-process partition registry.
#[derive(Clone, Default)]
pub struct Partitions {
    entries: Vec<Arc<dyn StoragePartition>>,
}

impl Partitions {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a partition.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Configuration` if a partition with the same name
    /// is already registered.
    pub fn register(&mut self, partition: Arc<dyn StoragePartition>) -> Result<(), OutboxError> {
        if self.entries.iter().any(|p| p.name() == partition.name()) {
            return Err(OutboxError::Configuration(format!(
                "partition \"{}\" is already registered",
                partition.name()
            )));
        }
        self.entries.push(partition);
        Ok(())
    }

    /// Builder-style variant of [`Partitions::register`].
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Configuration` on a duplicate name.
    pub fn with(mut self, partition: Arc<dyn StoragePartition>) -> Result<Self, OutboxError> {
        self.register(partition)?;
        Ok(self)
    }

    /// Number of registered partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no partition is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Partitions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|p| p.name()))
            .finish()
    }
}

impl PartitionRegistry for Partitions {
    fn partitions(&self) -> Vec<Arc<dyn StoragePartition>> {
        self.entries.clone()
    }

    fn partition(&self, name: &str) -> Option<Arc<dyn StoragePartition>> {
        self.entries.iter().find(|p| p.name() == name).cloned()
    }
}
