//! Application layer: persistence and publication hooks, store factory and
//! maintenance tooling.

pub mod name_check;
pub mod persist_hook;
pub mod publish_hook;
pub mod store_factory;
