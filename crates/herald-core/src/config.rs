//! Outbox settings shared by the stores and the publisher.

use serde::{Deserialize, Serialize};

use crate::error::OutboxError;

/// Default event record table name.
pub const DEFAULT_TABLE_NAME: &str = "event";

/// Default number of unpublished records fetched per page.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Tunables for event storage and publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxSettings {
    /// Table holding event records in every partition.
    pub table_name: String,
    /// Page size used when scanning unpublished records.
    pub batch_size: usize,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_owned(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl OutboxSettings {
    /// Checks the settings before they are used to build stores.
    ///
    /// # Errors
    ///
    /// Returns `OutboxError::Configuration` if the table name is not a plain
    /// SQL identifier or the batch size is zero.
    pub fn validate(&self) -> Result<(), OutboxError> {
        validate_table_name(&self.table_name)?;
        if self.batch_size == 0 {
            return Err(OutboxError::Configuration(
                "batch_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes. Table names are
/// interpolated into SQL, so nothing else is allowed.
///
/// # Errors
///
/// Returns `OutboxError::Configuration` for anything else.
pub fn validate_table_name(name: &str) -> Result<(), OutboxError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_start && valid_rest && name.len() <= 63 {
        Ok(())
    } else {
        Err(OutboxError::Configuration(format!(
            "invalid event table name: {name:?}"
        )))
    }
}
