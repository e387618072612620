//! Herald maintenance commands: legacy event name checks and schema setup.

pub mod commands;
pub mod config;
pub mod error;
