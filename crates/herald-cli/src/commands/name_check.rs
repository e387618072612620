//! `herald name-check`: finds, and on request fixes, stored events whose type
//! name the deployed code no longer knows.

use std::sync::Arc;

use herald_core::codec::EventTypeResolver;
use herald_core::partition::PartitionRegistry;
use herald_outbox::application::name_check::{EventNameCheck, LegacyFix};
use herald_outbox::application::store_factory::EventStoreFactory;
use serde::Serialize;
use tracing::info;

use crate::error::AppError;

const LEGACY_MAP_HINT: &str = "the legacy map must be defined before event type names can \
be fixed; add a legacy_map section to the configuration file, e.g.\n\n\
legacy_map:\n  legacy.account_opened: account.opened\n  legacy.audit_trail: ~\n";

/// Options of one name-check run.
#[derive(Debug, Clone)]
pub struct NameCheckOptions {
    /// Partition to inspect.
    pub partition: String,
    /// Apply the legacy map.
    pub fix: bool,
}

/// What a name-check run found and changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameCheckReport {
    pub partition: String,
    pub legacy: Vec<String>,
    pub fixes: Vec<LegacyFix>,
}

impl NameCheckReport {
    /// Human-readable summary.
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines = vec![format!("Checked legacy events in partition: {}", self.partition)];
        if self.legacy.is_empty() {
            lines.push("No legacy event types found".to_owned());
        } else {
            lines.push(format!("Found {} legacy event types", self.legacy.len()));
            lines.extend(self.legacy.iter().map(|type_name| format!("  {type_name}")));
        }
        lines.extend(self.fixes.iter().map(|fix| match fix {
            LegacyFix::Renamed { from, to, rows } => format!("Fixed {from} => {to} ({rows} rows)"),
            LegacyFix::Deleted { type_name, rows } => format!("Removed {type_name} ({rows} rows)"),
            LegacyFix::Unfixable { type_name } => {
                format!("Cannot fix, not found in legacy map: {type_name}")
            }
            LegacyFix::Kept { type_name } => {
                format!("Kept {type_name} (pass --delete to remove it)")
            }
        }));

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

/// Runs the check against one partition of `registry`.
///
/// # Errors
///
/// `AppError::Outbox` for unknown or non-relational partitions and store
/// failures; `AppError::Config` when the partition has no event table;
/// `AppError::Invalid` when fixing without a legacy map.
pub async fn run(
    registry: Arc<dyn PartitionRegistry>,
    resolver: &dyn EventTypeResolver,
    check: &EventNameCheck,
    options: &NameCheckOptions,
) -> Result<NameCheckReport, AppError> {
    let partition = EventStoreFactory::new(registry).partition(&options.partition)?;
    if !partition.has_event_schema().await? {
        return Err(AppError::Config(format!(
            "partition \"{}\" does not have the event table; cannot check for legacy events",
            options.partition
        )));
    }
    if options.fix && !check.can_fix() {
        return Err(AppError::Invalid(LEGACY_MAP_HINT.to_owned()));
    }
    info!(partition = %options.partition, fix = options.fix, "checking legacy events");

    let mut store = partition.event_store().await?;
    let legacy = check.find_legacy_types(store.as_mut(), resolver).await?;
    let fixes = if options.fix {
        check.fix(store.as_mut(), &legacy).await?
    } else {
        Vec::new()
    };

    Ok(NameCheckReport {
        partition: options.partition.clone(),
        legacy,
        fixes,
    })
}
