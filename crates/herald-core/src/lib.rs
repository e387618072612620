//! Herald Core: shared outbox abstractions.
//!
//! This crate defines the traits and types that the persistence hooks, the
//! publisher and every storage backend depend on. It contains no
//! infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod lock;
pub mod partition;
pub mod record;
pub mod store;
