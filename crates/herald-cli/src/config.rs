//! CLI configuration file.
//!
//! ```yaml
//! settings:
//!   table_name: event
//! partitions:
//!   default: { url: "postgres://localhost/app" }
//!   tenant_a: { url: "postgres://localhost/tenant_a" }
//! known_event_types: [account.opened, account.closed]
//! legacy_map:
//!   legacy.account_opened: account.opened
//!   legacy.audit_trail: ~
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use herald_core::codec::KnownEventTypes;
use herald_core::config::OutboxSettings;
use herald_core::partition::Partitions;
use herald_event_store::pg_partition::PgPartition;
use herald_outbox::application::name_check::EventNameCheck;
use herald_outbox::application::store_factory::DEFAULT_PARTITION;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AppError;

/// Connection settings of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PartitionConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
}

/// Parsed `herald.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeraldConfig {
    pub settings: OutboxSettings,
    pub partitions: BTreeMap<String, PartitionConfig>,
    /// Type names the deployed code can decode.
    pub known_event_types: Vec<String>,
    /// Old type name to new type name, or `null` to mark it for deletion.
    pub legacy_map: BTreeMap<String, Option<String>>,
}

impl HeraldConfig {
    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Yaml` for malformed documents and
    /// `AppError::Outbox` for invalid settings.
    pub fn from_yaml(yaml: &str) -> Result<Self, AppError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.settings.validate()?;
        Ok(config)
    }

    /// Loads `path`, falling back to an empty configuration when the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file exists but cannot be read, and
    /// parse errors as [`HeraldConfig::from_yaml`] does.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            warn!(path = %path.display(), "configuration file not found, using defaults");
            return Ok(Self::default());
        }
        let yaml = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&yaml)?;
        info!(
            path = %path.display(),
            partitions = config.partitions.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Registers `database_url` as the `default` partition when no
    /// partition is configured.
    #[must_use]
    pub fn with_database_url(mut self, database_url: Option<String>) -> Self {
        if let Some(url) = database_url.filter(|_| self.partitions.is_empty()) {
            self.partitions
                .insert(DEFAULT_PARTITION.to_owned(), PartitionConfig { url });
        }
        self
    }

    /// Resolver over the configured known event types.
    #[must_use]
    pub fn known_types(&self) -> KnownEventTypes {
        self.known_event_types.iter().cloned().collect()
    }

    /// Name checker over the configured legacy map.
    #[must_use]
    pub fn name_check(&self, delete_unfixable: bool) -> EventNameCheck {
        EventNameCheck::new(self.legacy_map.clone()).deleting_unfixable(delete_unfixable)
    }

    /// Builds one lazily connected partition per configured database.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when no partition is configured, and
    /// `AppError::Outbox` for malformed URLs or invalid settings.
    pub fn pg_partitions(&self) -> Result<Vec<PgPartition>, AppError> {
        if self.partitions.is_empty() {
            return Err(AppError::Config(
                "no partitions configured and DATABASE_URL is not set".into(),
            ));
        }
        self.partitions
            .iter()
            .map(|(name, partition)| {
                PgPartition::connect_lazy(name.clone(), &partition.url, &self.settings)
                    .map_err(AppError::from)
            })
            .collect()
    }
}

/// Registers `partitions` in order.
///
/// # Errors
///
/// Returns `AppError::Outbox` on duplicate names.
pub fn registry(partitions: &[PgPartition]) -> Result<Arc<Partitions>, AppError> {
    let mut registry = Partitions::new();
    for partition in partitions {
        registry.register(Arc::new(partition.clone()))?;
    }
    Ok(Arc::new(registry))
}
