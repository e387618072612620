//! `PostgreSQL` implementation of the `EventStore` trait.

use std::ops::DerefMut;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use tracing::debug;

use herald_core::error::OutboxError;
use herald_core::record::{EventRecord, PageCursor};
use herald_core::store::EventStore;

const COLUMNS: &str = "event_id, type_name, aggregate_root, occurred_on, event_body, published_on";

/// Event store over one `PostgreSQL` connection.
///
/// `C` is anything that dereferences to a connection: a pooled connection
/// for committed reads and writes, or `&mut PgConnection` borrowed from an
/// open transaction, in which case every write joins that transaction.
#[derive(Debug)]
pub struct PgEventStore<C> {
    conn: C,
    table: String,
}

impl<C> PgEventStore<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    /// Creates a store over `conn` using the already validated `table`.
    #[must_use]
    pub fn new(conn: C, table: impl Into<String>) -> Self {
        Self {
            conn,
            table: table.into(),
        }
    }

    /// Name of the event record table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl<C> EventStore for PgEventStore<C>
where
    C: DerefMut<Target = PgConnection> + Send,
{
    async fn append(&mut self, record: &EventRecord) -> Result<(), OutboxError> {
        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, NULL)",
            self.table
        );
        sqlx::query(&sql)
            .bind(record.event_id)
            .bind(&record.type_name)
            .bind(&record.aggregate_root)
            .bind(record.occurred_on)
            .bind(&record.event_body)
            .execute(&mut *self.conn)
            .await
            .map_err(persistence)?;

        debug!(event_id = %record.event_id, type_name = %record.type_name, "appended event record");
        Ok(())
    }

    async fn replace(&mut self, record: &EventRecord) -> Result<(), OutboxError> {
        // One statement, so the delete and insert are atomic even outside a
        // transaction.
        let sql = format!(
            r"
            WITH removed AS (
                DELETE FROM {table}
                WHERE aggregate_root = $3 AND type_name = $2 AND published_on IS NULL
            )
            INSERT INTO {table} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, NULL)
            ",
            table = self.table
        );
        sqlx::query(&sql)
            .bind(record.event_id)
            .bind(&record.type_name)
            .bind(&record.aggregate_root)
            .bind(record.occurred_on)
            .bind(&record.event_body)
            .execute(&mut *self.conn)
            .await
            .map_err(persistence)?;

        debug!(event_id = %record.event_id, type_name = %record.type_name, "replaced event record");
        Ok(())
    }

    async fn unpublished_after(
        &mut self,
        after: Option<PageCursor>,
        limit: usize,
    ) -> Result<Vec<EventRecord>, OutboxError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match after {
            None => {
                let sql = format!(
                    r"
                    SELECT {COLUMNS} FROM {}
                    WHERE published_on IS NULL
                    ORDER BY occurred_on ASC, event_id ASC
                    LIMIT $1
                    ",
                    self.table
                );
                sqlx::query(&sql)
                    .bind(limit)
                    .fetch_all(&mut *self.conn)
                    .await
            }
            Some(cursor) => {
                let sql = format!(
                    r"
                    SELECT {COLUMNS} FROM {}
                    WHERE published_on IS NULL AND (occurred_on, event_id) > ($1, $2)
                    ORDER BY occurred_on ASC, event_id ASC
                    LIMIT $3
                    ",
                    self.table
                );
                sqlx::query(&sql)
                    .bind(cursor.occurred_on)
                    .bind(cursor.event_id)
                    .bind(limit)
                    .fetch_all(&mut *self.conn)
                    .await
            }
        }
        .map_err(persistence)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn refresh(&mut self, record: &mut EventRecord) -> Result<bool, OutboxError> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE event_id = $1", self.table);
        let row = sqlx::query(&sql)
            .bind(record.event_id)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(persistence)?;

        match row {
            Some(row) => {
                *record = row_to_record(&row)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn publish(
        &mut self,
        record: &mut EventRecord,
        published_on: DateTime<Utc>,
    ) -> Result<(), OutboxError> {
        let sql = format!(
            "UPDATE {} SET published_on = $2 WHERE event_id = $1 AND published_on IS NULL",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(record.event_id)
            .bind(published_on)
            .execute(&mut *self.conn)
            .await
            .map_err(persistence)?;

        if result.rows_affected() == 0 {
            return Err(if self.refresh(record).await? {
                OutboxError::AlreadyPublished(record.event_id)
            } else {
                OutboxError::RecordNotFound(record.event_id)
            });
        }
        record.published_on = Some(published_on);
        Ok(())
    }

    async fn type_names(&mut self) -> Result<Vec<String>, OutboxError> {
        let sql = format!(
            "SELECT DISTINCT type_name FROM {} ORDER BY type_name ASC",
            self.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(persistence)?;

        rows.iter()
            .map(|row| row.try_get("type_name").map_err(persistence))
            .collect()
    }

    async fn rename_type(&mut self, from: &str, to: &str) -> Result<u64, OutboxError> {
        let sql = format!(
            "UPDATE {} SET type_name = $2 WHERE type_name = $1",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(from)
            .bind(to)
            .execute(&mut *self.conn)
            .await
            .map_err(persistence)?;

        Ok(result.rows_affected())
    }

    async fn delete_type(&mut self, type_name: &str) -> Result<u64, OutboxError> {
        let sql = format!("DELETE FROM {} WHERE type_name = $1", self.table);
        let result = sqlx::query(&sql)
            .bind(type_name)
            .execute(&mut *self.conn)
            .await
            .map_err(persistence)?;

        Ok(result.rows_affected())
    }
}

fn row_to_record(row: &PgRow) -> Result<EventRecord, OutboxError> {
    Ok(EventRecord {
        event_id: row.try_get("event_id").map_err(persistence)?,
        type_name: row.try_get("type_name").map_err(persistence)?,
        aggregate_root: row.try_get("aggregate_root").map_err(persistence)?,
        occurred_on: row.try_get("occurred_on").map_err(persistence)?,
        event_body: row.try_get("event_body").map_err(persistence)?,
        published_on: row.try_get("published_on").map_err(persistence)?,
    })
}

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn persistence(err: sqlx::Error) -> OutboxError {
    OutboxError::Persistence(err.to_string())
}
