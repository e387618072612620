//! Event record table schema.

/// SQL to create the default `event` table. Kept in step with
/// `migrations/0001_create_event_table.sql`.
pub const CREATE_EVENT_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS event (
    event_id       UUID PRIMARY KEY,
    type_name      VARCHAR(255) NOT NULL,
    aggregate_root VARCHAR(255) NOT NULL,
    occurred_on    TIMESTAMPTZ NOT NULL,
    event_body     TEXT NOT NULL,
    published_on   TIMESTAMPTZ NULL
);

CREATE INDEX IF NOT EXISTS idx_event_unpublished
    ON event (occurred_on, event_id) WHERE published_on IS NULL;

CREATE INDEX IF NOT EXISTS idx_event_replacement_key
    ON event (aggregate_root, type_name);
";

/// Schema for an event table with a custom name.
///
/// `table` must already have passed
/// [`validate_table_name`](herald_core::config::validate_table_name).
#[must_use]
pub fn create_event_table_sql(table: &str) -> String {
    format!(
        r"
CREATE TABLE IF NOT EXISTS {table} (
    event_id       UUID PRIMARY KEY,
    type_name      VARCHAR(255) NOT NULL,
    aggregate_root VARCHAR(255) NOT NULL,
    occurred_on    TIMESTAMPTZ NOT NULL,
    event_body     TEXT NOT NULL,
    published_on   TIMESTAMPTZ NULL
);

CREATE INDEX IF NOT EXISTS idx_{table}_unpublished
    ON {table} (occurred_on, event_id) WHERE published_on IS NULL;

CREATE INDEX IF NOT EXISTS idx_{table}_replacement_key
    ON {table} (aggregate_root, type_name);
"
    )
}
