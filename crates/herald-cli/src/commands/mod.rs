//! CLI subcommand implementations.

pub mod migrate;
pub mod name_check;
