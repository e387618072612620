//! `PostgreSQL` storage partitions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};

use herald_core::config::{OutboxSettings, validate_table_name};
use herald_core::error::OutboxError;
use herald_core::partition::{PartitionTransaction, StoragePartition};
use herald_core::store::EventStore;

use crate::pg_event_store::{PgEventStore, persistence};
use crate::schema::create_event_table_sql;

/// One `PostgreSQL` database registered as a storage partition.
///
/// Transactions must be opened through [`StoragePartition::begin`] or
/// [`PgPartition::begin_transaction`] so the publisher can see that one is in
/// progress.
#[derive(Debug, Clone)]
pub struct PgPartition {
    name: String,
    pool: PgPool,
    table: String,
    active_transactions: Arc<AtomicUsize>,
}

impl PgPartition {
    /// Wraps an existing pool.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Configuration` if the settings are invalid.
    pub fn new(
        name: impl Into<String>,
        pool: PgPool,
        settings: &OutboxSettings,
    ) -> Result<Self, OutboxError> {
        settings.validate()?;
        Ok(Self {
            name: name.into(),
            pool,
            table: settings.table_name.clone(),
            active_transactions: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Connects a new pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Configuration` for invalid settings and
    /// `OutboxError::Persistence` if the database is unreachable.
    pub async fn connect(
        name: impl Into<String>,
        database_url: &str,
        settings: &OutboxSettings,
    ) -> Result<Self, OutboxError> {
        let name = name.into();
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(persistence)?;
        info!(partition = %name, "connected storage partition");
        Self::new(name, pool, settings)
    }

    /// Like [`PgPartition::connect`], but no connection is opened until the
    /// partition is first used.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Configuration` for invalid settings or a
    /// malformed URL.
    pub fn connect_lazy(
        name: impl Into<String>,
        database_url: &str,
        settings: &OutboxSettings,
    ) -> Result<Self, OutboxError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| OutboxError::Configuration(format!("invalid database url: {e}")))?;
        Self::new(name, pool, settings)
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the event record table and its indexes if missing.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Persistence` if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), OutboxError> {
        validate_table_name(&self.table)?;
        sqlx::raw_sql(&create_event_table_sql(&self.table))
            .execute(&self.pool)
            .await
            .map_err(persistence)?;
        info!(partition = %self.name, table = %self.table, "event table ready");
        Ok(())
    }

    /// Opens a transaction whose connection stays reachable, so entity writes
    /// and event records can share it.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Persistence` if no connection is available.
    pub async fn begin_transaction(&self) -> Result<PgPartitionTransaction, OutboxError> {
        let tx = self.pool.begin().await.map_err(persistence)?;
        debug!(partition = %self.name, "transaction opened");
        Ok(PgPartitionTransaction {
            partition: self.name.clone(),
            table: self.table.clone(),
            tx,
            active: ActiveTransaction::enter(&self.active_transactions),
        })
    }
}

#[async_trait]
impl StoragePartition for PgPartition {
    fn name(&self) -> &str {
        &self.name
    }

    async fn has_event_schema(&self) -> Result<bool, OutboxError> {
        let row = sqlx::query("SELECT to_regclass($1) IS NOT NULL AS present")
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await
            .map_err(persistence)?;
        row.try_get("present").map_err(persistence)
    }

    fn is_transaction_active(&self) -> bool {
        self.active_transactions.load(Ordering::SeqCst) > 0
    }

    async fn begin(&self) -> Result<Box<dyn PartitionTransaction>, OutboxError> {
        Ok(Box::new(self.begin_transaction().await?))
    }

    async fn event_store(&self) -> Result<Box<dyn EventStore>, OutboxError> {
        let conn = self.pool.acquire().await.map_err(persistence)?;
        Ok(Box::new(PgEventStore::new(conn, self.table.clone())))
    }
}

/// Marks a partition as having an open transaction until dropped.
#[derive(Debug)]
struct ActiveTransaction(Arc<AtomicUsize>);

impl ActiveTransaction {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveTransaction {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An open transaction on a [`PgPartition`]. Dropping it rolls back.
pub struct PgPartitionTransaction {
    partition: String,
    table: String,
    tx: Transaction<'static, Postgres>,
    active: ActiveTransaction,
}

impl std::fmt::Debug for PgPartitionTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgPartitionTransaction")
            .field("partition", &self.partition)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl PgPartitionTransaction {
    /// The transaction's connection, for the caller's own entity writes.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.tx
    }
}

#[async_trait]
impl PartitionTransaction for PgPartitionTransaction {
    fn partition_name(&self) -> &str {
        &self.partition
    }

    fn event_store(&mut self) -> Box<dyn EventStore + '_> {
        Box::new(PgEventStore::new(&mut *self.tx, self.table.clone()))
    }

    async fn commit(self: Box<Self>) -> Result<(), OutboxError> {
        let Self {
            partition, tx, active, ..
        } = *self;
        let result = tx.commit().await.map_err(persistence);
        drop(active);
        result?;
        debug!(partition = %partition, "transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), OutboxError> {
        let Self {
            partition, tx, active, ..
        } = *self;
        let result = tx.rollback().await.map_err(persistence);
        drop(active);
        result?;
        debug!(partition = %partition, "transaction rolled back");
        Ok(())
    }
}
