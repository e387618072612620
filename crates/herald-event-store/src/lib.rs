//! `PostgreSQL` storage for the Herald outbox.

pub mod pg_event_store;
pub mod pg_lock;
pub mod pg_partition;
pub mod schema;
