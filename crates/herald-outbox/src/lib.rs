//! Herald: transactional outbox for domain events.
//!
//! Events recorded on aggregates are written to the partition's event store
//! inside the unit of work that changed the aggregates, then published after
//! the surrounding request or command has finished.

pub mod application;
pub mod domain;
