//! Herald CLI error types.

use herald_core::error::OutboxError;
use thiserror::Error;

/// Failures of a CLI run, each mapped to a process exit code.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or inconsistent configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested options cannot be carried out as given.
    #[error("invalid invocation: {0}")]
    Invalid(String),

    /// Store, lock or codec failure.
    #[error("outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// Configuration file could not be read.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid YAML for the expected shape.
    #[error("invalid configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl AppError {
    /// Process exit code: 2 for invalid invocations, 1 for everything else.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Invalid(_) => 2,
            Self::Config(_) | Self::Outbox(_) | Self::Io(_) | Self::Yaml(_) => 1,
        }
    }
}
