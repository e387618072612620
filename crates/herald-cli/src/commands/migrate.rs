//! `herald migrate`: creates the event table in configured partitions.

use herald_core::partition::StoragePartition;
use herald_event_store::pg_partition::PgPartition;
use tracing::info;

use crate::error::AppError;

/// Creates the event table in the named partition, or in every partition
/// when no name is given. Returns the names of the migrated partitions.
///
/// # Errors
///
/// `AppError::Config` for an unknown partition name; `AppError::Outbox` if
/// the DDL fails.
pub async fn run(partitions: &[PgPartition], only: Option<&str>) -> Result<Vec<String>, AppError> {
    let targets: Vec<&PgPartition> = match only {
        Some(name) => vec![select(partitions, name)?],
        None => partitions.iter().collect(),
    };

    let mut migrated = Vec::with_capacity(targets.len());
    for partition in targets {
        partition.ensure_schema().await?;
        info!(partition = partition.name(), "partition migrated");
        migrated.push(partition.name().to_owned());
    }
    Ok(migrated)
}

fn select<'a>(partitions: &'a [PgPartition], name: &str) -> Result<&'a PgPartition, AppError> {
    partitions
        .iter()
        .find(|p| p.name() == name)
        .ok_or_else(|| AppError::Config(format!("partition \"{name}\" does not exist")))
}
